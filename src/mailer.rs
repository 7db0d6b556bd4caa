//! SMTP delivery of the finished report.
//!
//! Uses `lettre`'s async transport on the Tokio runtime. The relay is plain
//! SMTP on port 25 unless STARTTLS or another port is configured.

use crate::error::Error;
use crate::report::{InlineImage, RunContext, build_message};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

/// Default SMTP port of a mail relay.
pub const DEFAULT_PORT: u16 = 25;

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub starttls: bool,
    pub credentials: Option<(String, String)>,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("starttls", &self.starttls)
            .field("user", &self.credentials.as_ref().map(|(user, _)| user))
            .finish()
    }
}

impl SmtpSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            starttls: false,
            credentials: None,
        }
    }

    /// Parses `host` or `host:port`. IPv6 addresses are written in brackets
    /// when a port follows (`[::1]:2525`); a bare IPv6 address uses the
    /// default port.
    ///
    /// # Example
    ///
    /// ```rust
    /// use panelmail::mailer::SmtpSettings;
    ///
    /// let relay = SmtpSettings::parse("mail.example.com:2525").unwrap();
    /// assert_eq!(relay.host, "mail.example.com");
    /// assert_eq!(relay.port, 2525);
    /// assert_eq!(SmtpSettings::parse("mail.example.com").unwrap().port, 25);
    /// assert_eq!(SmtpSettings::parse("[::1]:2525").unwrap().host, "::1");
    /// ```
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        let (host, port) = if let Some(rest) = value.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| format!("'{}' is missing a closing bracket", value))?;
            match rest {
                "" => (host, None),
                _ => match rest.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(format!("'{}' is not a valid mail host", value)),
                },
            }
        } else if value.matches(':').count() > 1 {
            (value, None)
        } else {
            match value.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (value, None),
            }
        };

        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| format!("'{}' is not a valid port number", port))?,
            None => DEFAULT_PORT,
        };
        if host.is_empty() {
            return Err(String::from("The mail host must not be empty"));
        }
        Ok(Self::new(host, port))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, Error> {
        let mut builder = if self.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .map_err(|e| Error::SendFailed(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
        };
        builder = builder.port(self.port);
        if let Some((user, password)) = &self.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

/// Sends the report to every recipient, one message each.
///
/// The first rejected or undeliverable message aborts delivery; there is no
/// partial-success mode.
pub async fn send_report(
    settings: &SmtpSettings,
    context: &RunContext,
    recipients: &[Mailbox],
    images: &[InlineImage],
) -> Result<(), Error> {
    let transport = settings.transport()?;

    for recipient in recipients {
        let message = build_message(context, recipient, images)?;
        transport
            .send(message)
            .await
            .map_err(|e| Error::SendFailed(format!("{}: {}", recipient, e)))?;
        tracing::info!(%recipient, relay = %settings.host, "report sent");
    }

    Ok(())
}
