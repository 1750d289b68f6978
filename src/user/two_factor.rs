//! Secondary email used to recover an account.

use crate::error::{Result, ServerError};

/// Where the secondary email stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    /// No secondary email.
    Unbound,
    /// Added, waiting for its code.
    Added,
    /// Ownership proven.
    Verified,
    /// Switched off by its owner, kept on the account.
    Disabled,
}

/// Two-factor email settings of an account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TwoFactorEmail {
    /// Feature switch.
    pub enabled: bool,
    pub email: Option<String>,
    pub verified: bool,
    pub force_disabled: bool,
}

impl TwoFactorEmail {
    pub fn state(&self) -> BindingState {
        match (&self.email, self.force_disabled, self.verified) {
            (None, ..) => BindingState::Unbound,
            (Some(_), true, _) => BindingState::Disabled,
            (Some(_), false, true) => BindingState::Verified,
            (Some(_), false, false) => BindingState::Added,
        }
    }

    /// Turn the feature on. Clears a previous force-disable.
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled && !self.force_disabled {
            return Err(ServerError::Conflict(
                "Two-factor authentication is already enabled.",
            ));
        }

        self.enabled = true;
        self.force_disabled = false;
        Ok(())
    }

    pub fn disable(&mut self) -> Result<()> {
        if !self.enabled {
            return Err(ServerError::Conflict(
                "Two-factor authentication is already disabled.",
            ));
        }

        self.enabled = false;
        Ok(())
    }

    /// Switch the bound email off, along with the feature.
    /// Returns the state before the switch.
    pub fn force_disable(&mut self) -> Result<BindingState> {
        let previous = self.state();
        match previous {
            BindingState::Unbound => {
                return Err(ServerError::Precondition(
                    "No two-factor email to disable, please add one first.",
                ));
            },
            BindingState::Disabled => {
                return Err(ServerError::Conflict(
                    "Your two-factor email is already disabled.",
                ));
            },
            BindingState::Added | BindingState::Verified => {},
        }

        self.force_disabled = true;
        self.enabled = false;
        Ok(previous)
    }

    /// Checks run before `candidate` can be attached.
    /// Uniqueness across accounts is checked by the caller.
    pub fn ensure_bindable(&self, primary: &str, candidate: &str) -> Result<()> {
        if primary == candidate {
            return Err(ServerError::Conflict(
                "Your two-factor email cannot be your primary email.",
            ));
        }

        match self.state() {
            BindingState::Disabled => Err(ServerError::Conflict(
                "Your two-factor email is disabled, please enable two-factor authentication again.",
            )),
            _ if !self.enabled => Err(ServerError::Precondition(
                "Please enable two-factor authentication first.",
            )),
            BindingState::Verified => Err(ServerError::Conflict(
                "A verified two-factor email is already linked to your account.",
            )),
            BindingState::Added => Err(ServerError::Conflict(
                "A two-factor email is already added, please verify it.",
            )),
            BindingState::Unbound => Ok(()),
        }
    }

    /// Record a new, unverified binding.
    pub fn attach(&mut self, email: String) {
        self.email = Some(email);
        self.verified = false;
        self.force_disabled = false;
    }

    pub fn is_bound_to(&self, email: &str) -> bool {
        self.email.as_deref() == Some(email)
    }

    /// The bound email, when it can be used for password recovery.
    pub fn recovery_email(&self) -> Result<&str> {
        if !self.enabled && !self.force_disabled {
            return Err(ServerError::Precondition(
                "Please enable two-factor authentication first.",
            ));
        }

        match (self.state(), self.email.as_deref()) {
            (BindingState::Verified, Some(email)) => Ok(email),
            (BindingState::Disabled, _) => Err(ServerError::Precondition(
                "Your two-factor email has been disabled by you, please enable it again.",
            )),
            (BindingState::Added, _) => Err(ServerError::Precondition(
                "Your two-factor email is not verified, please verify it first.",
            )),
            _ => Err(ServerError::Precondition(
                "No two-factor email is linked to your account.",
            )),
        }
    }
}
