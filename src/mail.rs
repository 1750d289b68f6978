//! Send emails to users for important updates.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use url::Url;

use crate::config::Mail;
use crate::error::{Result, ServerError};
use crate::ports::Notifier;

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const ID_LENGTH: usize = 12;

/// Emails sent by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Code to confirm the primary email.
    EmailVerify,
    AccountVerified,
    /// Code to reset the password, sent to the primary email.
    PasswordResetRequest,
    PasswordResetSuccess,
    /// Code to reset the password, sent to the two-factor email.
    TwoFactorPasswordReset,
    TwoFactorPasswordResetSuccess,
    /// Code to confirm the two-factor email.
    TwoFactorEmailVerify,
    TwoFactorEmailVerified,
}

impl Template {
    pub fn subject(self) -> &'static str {
        match self {
            Template::EmailVerify | Template::TwoFactorEmailVerify => {
                "Email Verification OTP"
            },
            Template::AccountVerified => "Your Account Verified Successfully",
            Template::PasswordResetRequest => "Password Reset OTP",
            Template::PasswordResetSuccess => "Password Changed Successfully",
            Template::TwoFactorPasswordReset => "Reset Password",
            Template::TwoFactorPasswordResetSuccess => {
                "Your Primary Account Password Reset Success"
            },
            Template::TwoFactorEmailVerified => "Two Factor Email Verified",
        }
    }
}

/// Values injected into a template.
#[derive(Debug)]
pub struct Variables<'a> {
    /// Display name of the account.
    pub name: &'a str,
    /// Primary email of the account.
    pub email: &'a str,
    pub code: Option<u32>,
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Render a template into an HTML body.
pub fn render(template: Template, vars: &Variables) -> String {
    let name = escape(vars.name);
    let email = escape(vars.email);
    let code = vars
        .code
        .map(|code| format!("<p class=\"code\"><strong>{code}</strong></p>"))
        .unwrap_or_default();

    let content = match template {
        Template::EmailVerify => format!(
            "<p>Welcome to Mihu! Use this code to verify your email:</p>{code}\
             <p>It expires in 10 minutes.</p>"
        ),
        Template::AccountVerified => format!(
            "<p>Your account <b>{email}</b> is verified. You can now log in.</p>"
        ),
        Template::PasswordResetRequest => format!(
            "<p>Use this code to reset your password:</p>{code}\
             <p>It expires in 10 minutes. Ignore this email if you did not ask for it.</p>"
        ),
        Template::PasswordResetSuccess => format!(
            "<p>The password of <b>{email}</b> has been changed.</p>"
        ),
        Template::TwoFactorPasswordReset => format!(
            "<p>A password reset was requested for <b>{email}</b>. \
             Use this code to set a new password:</p>{code}\
             <p>It expires in 10 minutes.</p>"
        ),
        Template::TwoFactorPasswordResetSuccess => format!(
            "<p>The password of your primary account <b>{email}</b> \
             has been reset through this two-factor email.</p>"
        ),
        Template::TwoFactorEmailVerify => format!(
            "<p>Use this code to link this address as the two-factor email of \
             <b>{email}</b>:</p>{code}<p>It expires in 10 minutes.</p>"
        ),
        Template::TwoFactorEmailVerified => format!(
            "<p>This address is now the verified two-factor email of \
             <b>{email}</b>.</p>"
        ),
    };

    format!(
        "<!DOCTYPE html><html><body><h2>Hello {name},</h2>{content}\
         <p>The Mihu team</p></body></html>"
    )
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Publishes rendered emails on a RabbitMQ queue.
/// Without connection, messages are only logged.
#[derive(Clone, Default)]
pub struct MailManager {
    queue: String,
    conn: Option<Arc<Connection>>,
}

impl MailManager {
    /// Create a new [`MailManager`].
    pub async fn new(config: &Mail) -> Result<Self> {
        let addr = Url::parse(&config.address).map_err(|err| {
            ServerError::Internal {
                details: "invalid rabbitmq address".into(),
                source: Some(Box::new(err)),
            }
        })?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme()).map_err(|details| {
                ServerError::Internal {
                    details,
                    source: None,
                }
            })?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let conn_config = ConnectionProperties::default()
            .with_connection_name("mihu_mail_client".into());
        let conn = Connection::connect_uri(uri, conn_config)
            .await
            .map_err(|err| ServerError::dependency("rabbitmq", err))?;

        tracing::info!(%addr, queue = %config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            conn: Some(Arc::new(conn)),
        })
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> std::result::Result<Channel, lapin::Error> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        let id = Alphanumeric.sample_string(&mut OsRng, ID_LENGTH);
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.mihu.email",
            source: "com.mihu.api",
            id,
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }

    async fn publish(
        conn: Arc<Connection>,
        queue: &str,
        payload: &[u8],
    ) -> std::result::Result<(), lapin::Error> {
        let channel = Self::create_channel(conn, queue).await?;
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for MailManager {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let Some(conn) = &self.conn else {
            tracing::debug!(%to, %subject, "no mail queue, message dropped");
            return Ok(());
        };

        let payload = Self::create_event(Content {
            to,
            subject,
            html: body,
        });
        let payload = serde_json::to_vec(&payload)?;

        Self::publish(Arc::clone(conn), &self.queue, &payload)
            .await
            .map_err(|err| ServerError::dependency("rabbitmq", err))?;

        tracing::trace!(%subject, "mail event sent");

        Ok(())
    }
}
