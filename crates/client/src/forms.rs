//! Client-side checks run before anything is dispatched.

use api_types::{
    auth::ChangePasswordRequest,
    investor::{InvestorNew, InvestorUpdate},
};

use crate::error::{ClientError, Result};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<ChangePasswordRequest> {
        if self.new_password != self.confirm_password {
            return Err(ClientError::Validation(
                "New password and confirmation do not match.".to_string(),
            ));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters."
            )));
        }
        Ok(ChangePasswordRequest {
            old_password: self.old_password.clone(),
            new_password: self.new_password.clone(),
        })
    }
}

/// Admin form backing both investor create and update.
#[derive(Debug, Clone, Default)]
pub struct InvestorForm {
    pub name: String,
    pub identifier: Option<String>,
    pub initial_investment: Option<f64>,
    pub shares: Option<f64>,
    pub is_admin: bool,
    /// Required on create, never sent on update.
    pub password: Option<String>,
}

impl InvestorForm {
    pub fn to_new(&self) -> Result<InvestorNew> {
        let name = self.checked_name()?;
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ClientError::Validation("A password is required.".to_string()))?;
        Ok(InvestorNew {
            name,
            identifier: self.checked_identifier(),
            initial_investment: non_negative("initial investment", self.initial_investment)?
                .unwrap_or(0.0),
            shares: non_negative("shares", self.shares)?.unwrap_or(0.0),
            is_admin: self.is_admin,
            password: password.to_string(),
        })
    }

    pub fn to_update(&self) -> Result<InvestorUpdate> {
        Ok(InvestorUpdate {
            name: Some(self.checked_name()?),
            identifier: self.checked_identifier(),
            initial_investment: non_negative("initial investment", self.initial_investment)?,
            shares: non_negative("shares", self.shares)?,
            is_admin: Some(self.is_admin),
        })
    }

    fn checked_name(&self) -> Result<String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ClientError::Validation(
                "Investor name is required.".to_string(),
            ));
        }
        Ok(name.to_string())
    }

    fn checked_identifier(&self) -> Option<String> {
        self.identifier
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

fn non_negative(field: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ClientError::Validation(format!(
            "{field} must be a non-negative number."
        ))),
        other => Ok(other),
    }
}
