//! One-time code verification.
//!
//! Every workflow (primary email confirmation, password reset, password reset
//! through the two-factor email and two-factor email confirmation) goes
//! through the same issue and consume transitions. Each [`Purpose`] owns an
//! independent slot on the account, so a code issued for one purpose never
//! satisfies another.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::mail::{self, Template, Variables};
use crate::ports::{Clock, CodeGenerator, Notifier, UserRepository};
use crate::user::User;

/// Every issued code is a six-digit number in this range.
pub const CODE_RANGE: RangeInclusive<u32> = 100_000..=999_999;
const CODE_TTL_MINUTES: i64 = 10;

/// Time-to-live of an issued code.
pub fn code_ttl() -> TimeDelta {
    TimeDelta::minutes(CODE_TTL_MINUTES)
}

/// What a one-time code proves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Ownership of the primary email.
    EmailVerify,
    /// Password reset through the primary email.
    PasswordReset,
    /// Password reset through the two-factor email.
    PasswordReset2FA,
    /// Ownership of the two-factor email.
    TwoFactorEmailVerify,
}

impl Purpose {
    /// Checks that must hold before a code of this purpose is issued or
    /// consumed.
    pub fn check(self, user: &User) -> Result<()> {
        if self != Purpose::EmailVerify && !user.email_verified {
            return Err(ServerError::Precondition(
                "Please verify your account first.",
            ));
        }

        match self {
            Purpose::EmailVerify | Purpose::PasswordReset => Ok(()),
            Purpose::PasswordReset2FA => {
                user.two_factor.recovery_email().map(|_| ())
            },
            Purpose::TwoFactorEmailVerify if !user.two_factor.enabled => {
                Err(ServerError::Precondition(
                    "Please enable two-factor authentication first.",
                ))
            },
            Purpose::TwoFactorEmailVerify => Ok(()),
        }
    }

    /// A new code is refused while the previous one is still valid.
    fn guards_reissue(self) -> bool {
        matches!(self, Purpose::EmailVerify)
    }

    /// Where codes and confirmations are delivered.
    fn recipient(self, user: &User) -> Result<&str> {
        match self {
            Purpose::EmailVerify | Purpose::PasswordReset => Ok(&user.email),
            Purpose::PasswordReset2FA | Purpose::TwoFactorEmailVerify => {
                user.two_factor.email.as_deref().ok_or(
                    ServerError::Precondition(
                        "Please add a two-factor email first.",
                    ),
                )
            },
        }
    }

    fn issued(self) -> Template {
        match self {
            Purpose::EmailVerify => Template::EmailVerify,
            Purpose::PasswordReset => Template::PasswordResetRequest,
            Purpose::PasswordReset2FA => Template::TwoFactorPasswordReset,
            Purpose::TwoFactorEmailVerify => Template::TwoFactorEmailVerify,
        }
    }

    fn confirmed(self) -> Template {
        match self {
            Purpose::EmailVerify => Template::AccountVerified,
            Purpose::PasswordReset => Template::PasswordResetSuccess,
            Purpose::PasswordReset2FA => Template::TwoFactorPasswordResetSuccess,
            Purpose::TwoFactorEmailVerify => Template::TwoFactorEmailVerified,
        }
    }
}

/// A code waiting to be consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingCode {
    pub code: u32,
    pub expires_at: DateTime<Utc>,
}

impl PendingCode {
    /// A code is still valid at its expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Reasons a code transition is refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("no pending code or code mismatch")]
    Invalid,
    #[error("code expired")]
    Expired,
    #[error("previous code is still valid")]
    StillValid,
}

impl From<CodeError> for ServerError {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::Invalid => ServerError::InvalidCode,
            CodeError::Expired => ServerError::ExpiredCode,
            CodeError::StillValid => ServerError::Conflict(
                "Your previous code is still valid, please check your inbox.",
            ),
        }
    }
}

/// One slot per [`Purpose`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingCodes {
    pub email_verify: Option<PendingCode>,
    pub password_reset: Option<PendingCode>,
    pub password_reset_2fa: Option<PendingCode>,
    pub two_factor_email: Option<PendingCode>,
}

impl PendingCodes {
    pub fn get(&self, purpose: Purpose) -> Option<&PendingCode> {
        match purpose {
            Purpose::EmailVerify => self.email_verify.as_ref(),
            Purpose::PasswordReset => self.password_reset.as_ref(),
            Purpose::PasswordReset2FA => self.password_reset_2fa.as_ref(),
            Purpose::TwoFactorEmailVerify => self.two_factor_email.as_ref(),
        }
    }

    fn slot(&mut self, purpose: Purpose) -> &mut Option<PendingCode> {
        match purpose {
            Purpose::EmailVerify => &mut self.email_verify,
            Purpose::PasswordReset => &mut self.password_reset,
            Purpose::PasswordReset2FA => &mut self.password_reset_2fa,
            Purpose::TwoFactorEmailVerify => &mut self.two_factor_email,
        }
    }

    /// Store a fresh code, replacing any previous one of the same purpose.
    pub fn issue(
        &mut self,
        purpose: Purpose,
        code: u32,
        now: DateTime<Utc>,
    ) -> PendingCode {
        let pending = PendingCode {
            code,
            expires_at: now + code_ttl(),
        };
        *self.slot(purpose) = Some(pending);
        pending
    }

    /// Refuse to issue while a previous code is unexpired.
    pub fn ensure_reissuable(
        &self,
        purpose: Purpose,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), CodeError> {
        match self.get(purpose) {
            Some(pending) if now < pending.expires_at => {
                Err(CodeError::StillValid)
            },
            _ => Ok(()),
        }
    }

    /// Accept a supplied code and clear the slot.
    ///
    /// A missing slot or a wrong code is [`CodeError::Invalid`], checked
    /// before expiry. On error the slot is left untouched.
    pub fn consume(
        &mut self,
        purpose: Purpose,
        supplied: u32,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), CodeError> {
        let slot = self.slot(purpose);
        let pending = slot.ok_or(CodeError::Invalid)?;

        if pending.code != supplied {
            return Err(CodeError::Invalid);
        }
        if !pending.is_valid_at(now) {
            return Err(CodeError::Expired);
        }

        *slot = None;
        Ok(())
    }
}

/// A code redemption with the state change it unlocks.
#[derive(Debug)]
pub enum Redeem {
    EmailVerify,
    /// Plaintext new password, hashed only once the code is accepted.
    PasswordReset { password: String },
    PasswordReset2FA { password: String },
    TwoFactorEmailVerify,
}

impl Redeem {
    pub fn purpose(&self) -> Purpose {
        match self {
            Redeem::EmailVerify => Purpose::EmailVerify,
            Redeem::PasswordReset { .. } => Purpose::PasswordReset,
            Redeem::PasswordReset2FA { .. } => Purpose::PasswordReset2FA,
            Redeem::TwoFactorEmailVerify => Purpose::TwoFactorEmailVerify,
        }
    }
}

/// Runs code workflows against stored accounts.
///
/// The account is persisted before any message leaves, so a failed write
/// never produces a code the user cannot redeem.
#[derive(Clone)]
pub struct Verifier {
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    passwords: Arc<PasswordManager>,
}

impl Verifier {
    pub fn new(
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        passwords: Arc<PasswordManager>,
    ) -> Self {
        Self {
            users,
            notifier,
            clock,
            codes,
            passwords,
        }
    }

    /// Save a new account with its first email verification code.
    pub async fn enroll(&self, mut user: User) -> Result<User> {
        let (to, code) = self.prepare(&mut user, Purpose::EmailVerify)?;
        self.users.create(&user).await?;

        tracing::info!(user_id = %user.id, "account created");

        self.notify(&to, Purpose::EmailVerify.issued(), &user, Some(code))
            .await?;
        Ok(user)
    }

    /// Issue a code for `purpose` on an existing account.
    pub async fn issue(&self, user: &mut User, purpose: Purpose) -> Result<()> {
        let (to, code) = self.prepare(user, purpose)?;
        self.users.update(user).await?;

        tracing::debug!(user_id = %user.id, ?purpose, "one-time code issued");

        self.notify(&to, purpose.issued(), user, Some(code)).await
    }

    fn prepare(&self, user: &mut User, purpose: Purpose) -> Result<(String, u32)> {
        purpose.check(user)?;

        let now = self.clock.now();
        if purpose.guards_reissue() {
            user.codes.ensure_reissuable(purpose, now)?;
        }

        let to = purpose.recipient(user)?.to_owned();
        let pending = user.codes.issue(purpose, self.codes.next(), now);
        Ok((to, pending.code))
    }

    /// Consume a code and apply what it unlocks.
    pub async fn redeem(
        &self,
        user: &mut User,
        redeem: Redeem,
        code: u32,
    ) -> Result<()> {
        let purpose = redeem.purpose();
        purpose.check(user)?;

        let now = self.clock.now();
        user.codes.consume(purpose, code, now)?;

        match redeem {
            Redeem::EmailVerify => user.email_verified = true,
            Redeem::PasswordReset { password }
            | Redeem::PasswordReset2FA { password } => {
                user.password = self.passwords.hash_password(password)?;
            },
            Redeem::TwoFactorEmailVerify => user.two_factor.verified = true,
        }

        // a concurrent redeem of the same code loses here.
        self.users.redeem(user, purpose, code).await?;

        tracing::info!(user_id = %user.id, ?purpose, "one-time code redeemed");

        let to = purpose.recipient(user)?.to_owned();
        self.notify(&to, purpose.confirmed(), user, None).await
    }

    async fn notify(
        &self,
        to: &str,
        template: Template,
        user: &User,
        code: Option<u32>,
    ) -> Result<()> {
        let body = mail::render(
            template,
            &Variables {
                name: &user.name,
                email: &user.email,
                code,
            },
        );

        self.notifier.send(to, template.subject(), &body).await
    }
}
