//! Plain-text tables for the terminal.

use api_types::{
    fund::{FundHistory, FundSummary},
    holdings::{Holding, PreviewResult},
    investor::Investor,
};
use chrono::NaiveDate;

fn optional(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.decimals$}"))
}

pub fn summary(summary: &FundSummary) {
    println!("Date:        {}", summary.date);
    println!("NAV:         {:.4}", summary.nav);
    println!("Total value: {:.2}", summary.total_value);
    println!("Cash:        {:.2}", summary.cash);
    println!(
        "Change:      {} ({}%)",
        optional(summary.change_value, 2),
        optional(summary.change_pct, 2)
    );
}

pub fn investor(investor: &Investor) {
    println!("#{} {}", investor.id, investor.name);
    if let Some(identifier) = &investor.identifier {
        println!("  identifier:         {identifier}");
    }
    println!("  shares:             {:.4}", investor.shares);
    println!("  initial investment: {:.2}", investor.initial_investment);
    println!("  current value:      {:.2}", investor.current_value);
    println!(
        "  role:               {}",
        if investor.is_admin { "admin" } else { "investor" }
    );
}

pub fn investors(investors: &[Investor], nav: Option<f64>) {
    println!(
        "{:>4}  {:<20} {:>12} {:>14} {:>14}",
        "id", "name", "shares", "invested", "value"
    );
    for investor in investors {
        let value = nav.map_or(investor.current_value, |nav| investor.value_at(nav));
        println!(
            "{:>4}  {:<20} {:>12.4} {:>14.2} {:>14.2}",
            investor.id, investor.name, investor.shares, investor.initial_investment, value
        );
    }
    let total: f64 = investors
        .iter()
        .map(|i| nav.map_or(i.current_value, |nav| i.value_at(nav)))
        .sum();
    println!("{:>68.2}", total);
}

pub fn history(rows: &[FundHistory]) {
    if rows.is_empty() {
        println!("No history yet.");
        return;
    }
    println!("{:<10} {:>10} {:>14} {:>10}", "date", "nav", "total", "change %");
    for row in rows {
        println!(
            "{:<10} {:>10.4} {:>14.2} {:>10}",
            row.date,
            row.nav,
            row.total_value,
            optional(row.change_pct, 2)
        );
    }
}

pub fn holdings(date: NaiveDate, total: f64, rows: &[Holding]) {
    println!("Holdings on {date} (total {total:.2})");
    println!("{:<24} {:<10} {:>12} {:>14}", "name", "symbol", "quantity", "value");
    for row in rows {
        println!(
            "{:<24} {:<10} {:>12} {:>14.2}",
            row.name,
            row.symbol.as_deref().unwrap_or("-"),
            optional(row.quantity, 0),
            row.market_value
        );
    }
}

pub fn preview(preview: &PreviewResult) {
    println!(
        "Preview for {} ({} holdings, not saved yet)",
        preview.date,
        preview.holdings.len()
    );
    println!("{:<24} {:<10} {:>12} {:>14}", "name", "symbol", "quantity", "value");
    for draft in &preview.holdings {
        println!(
            "{:<24} {:<10} {:>12} {:>14.2}",
            draft.name,
            draft.symbol.as_deref().unwrap_or("-"),
            optional(draft.quantity, 0),
            draft.market_value
        );
    }
    println!("Holdings value: {:.2}", preview.holdings_value);
    println!("Cash:           {:.2}", preview.cash);
    println!("Total assets:   {:.2}", preview.total_assets);
    println!("NAV:            {}", preview.nav_label());
    let drafted = preview.drafted_value();
    if (drafted - preview.holdings_value).abs() > 0.005 {
        println!("Warning: rows add up to {drafted:.2}");
    }
}
