use crate::batch::{FetchOptions, RenderRequest};
use crate::dashboard::Selection;
use crate::error::Error;
use crate::mailer::SmtpSettings;
use crate::network::{ClientOptions, Credential, Endpoint};
use crate::storage::WorkDir;
use crate::utils::validate_basic_auth;
use crate::window::TimeWindow;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, ValueHint, value_parser};
use lettre::message::Mailbox;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default values used throughout the project.
pub mod defaults {
    /// Rendered image width in pixels.
    pub const WIDTH: u32 = 1000;

    /// Rendered image height in pixels.
    pub const HEIGHT: u32 = 500;

    /// Number of whole days covered by the report.
    pub const DAYS: u32 = 1;

    pub const SUBJECT: &str = "Grafana Report";

    pub const INTRO: &str = concat!(
        "This is the daily snapshot of the latest Grafana graphs.\n\n",
        "Best Regards,\nGrafana Team"
    );

    pub const MAIL_FROM: &str = "grafana@localhost";

    /// The default user agent header value used for network requests.
    pub const USER_AGENT: &str = concat!("panelmail/", env!("CARGO_PKG_VERSION"));

    /// Config file picked up from the working directory when `--config` is not given.
    pub const CONFIG_FILE: &str = ".panelmail.toml";
}

// region: Value parsers
/// A `--dashboard` value: `dashId` or `dashId,slug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardArg {
    pub id: String,
    pub slug: Option<String>,
}

/// A `--panel` value: a bare panel id (with `--dashboard`) or a
/// `dashId,slug,panelId` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelArg {
    Id(String),
    Qualified(RenderRequest),
}

fn parse_panel_id(value: &str) -> Result<String, String> {
    let value = value.trim();
    value
        .parse::<u64>()
        .map(|_| value.to_string())
        .map_err(|_| format!("Panel id '{}' must be an integer", value))
}

fn parse_dashboard_id(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        Err(String::from("Dashboard id must not be empty"))
    } else {
        Ok(value.to_string())
    }
}

pub fn parse_dashboard(value: &str) -> Result<DashboardArg, String> {
    match value.split(',').collect::<Vec<_>>().as_slice() {
        [id] => Ok(DashboardArg {
            id: parse_dashboard_id(id)?,
            slug: None,
        }),
        [id, slug] if !slug.trim().is_empty() => Ok(DashboardArg {
            id: parse_dashboard_id(id)?,
            slug: Some(slug.trim().to_string()),
        }),
        _ => Err(String::from(
            "Dashboard must be in the format 'dashId' or 'dashId,slug'",
        )),
    }
}

pub fn parse_panel(value: &str) -> Result<PanelArg, String> {
    match value.split(',').collect::<Vec<_>>().as_slice() {
        [panel_id] => Ok(PanelArg::Id(parse_panel_id(panel_id)?)),
        [id, slug, panel_id] if !slug.trim().is_empty() => Ok(PanelArg::Qualified(
            RenderRequest::panel(
                &parse_dashboard_id(id)?,
                Some(slug.trim()),
                &parse_panel_id(panel_id)?,
            ),
        )),
        _ => Err(String::from(
            "Panel must be in the format 'panelId' or 'dashId,slug,panelId'",
        )),
    }
}

pub fn parse_mailbox(value: &str) -> Result<Mailbox, String> {
    value
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| format!("'{}' is not a valid mail address: {}", value, e))
}

pub fn parse_server(value: &str) -> Result<Url, String> {
    let url =
        Url::parse(value.trim()).map_err(|e| format!("'{}' is not a valid URL: {}", value, e))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(format!(
            "'{}' must be an http(s) URL like http://grafana.example.com:3000",
            value
        )),
    }
}

fn validate_work_dir_str(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(shellexpand::tilde(s).as_ref());
    if path.exists() && !path.is_dir() {
        Err(format!(
            "❌ The working path '{}' is not a directory.",
            path.display()
        ))
    } else {
        fs::create_dir_all(&path).map_err(|e| format!("Failed to create directory: {}", e))?;
        Ok(path)
    }
}
// endregion

#[derive(Debug, Parser)]
#[command(version, about, term_width = 80)]
pub struct Cli {
    #[arg(
        short = 'f',
        long,
        help = "Sender address of the report mail [default: grafana@localhost]",
        value_parser = parse_mailbox
    )]
    pub mail_from: Option<Mailbox>,

    #[arg(
        short = 'm',
        long,
        num_args = 1..,
        help = "Recipients of the report, separated by spaces",
        value_parser = parse_mailbox
    )]
    pub mail_to: Vec<Mailbox>,

    #[arg(
        short = 'M',
        long,
        help = "Mail relay as `host` or `host:port` (port defaults to 25)",
        value_hint = ValueHint::Hostname,
        value_parser = SmtpSettings::parse
    )]
    pub mailhost: Option<SmtpSettings>,

    #[arg(long, help = "Upgrade the SMTP connection with STARTTLS")]
    pub smtp_starttls: bool,

    #[arg(long, help = "SMTP username, requires a password")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true, help = "SMTP password")]
    pub smtp_password: Option<String>,

    #[arg(
        short = 'G',
        long,
        env = "GRAFANA_SERVER",
        help = "Grafana server and port, e.g. http://grafana.example.com:3000",
        value_hint = ValueHint::Url,
        value_parser = parse_server
    )]
    pub grafana_server: Option<Url>,

    #[arg(
        short = 'T',
        long,
        env = "GRAFANA_API_TOKEN",
        hide_env_values = true,
        help = "Grafana API token, sent as a bearer token"
    )]
    pub api_token: Option<String>,

    #[arg(
        long,
        help = "Basic authentication credentials in the format `username:password`. Takes precedence over an API token",
        value_parser = validate_basic_auth,
    )]
    pub basic_auth: Option<String>,

    #[arg(
        short = 'D',
        long,
        help = "Dashboard as `dashId,slug` or just `dashId` (the slug is looked up). Without --panel, all panels of the dashboard are rendered",
        value_parser = parse_dashboard
    )]
    pub dashboard: Option<DashboardArg>,

    #[arg(
        short = 'P',
        long = "panel",
        num_args = 1..,
        help = "Panels as `dashId,slug,panelId` triples, or plain panel ids together with --dashboard",
        value_parser = parse_panel
    )]
    pub panels: Vec<PanelArg>,

    #[arg(
        long,
        help = "Render the dashboard given with --dashboard as a single image",
        requires = "dashboard",
        conflicts_with = "panels"
    )]
    pub whole_dashboard: bool,

    #[arg(
        long,
        help = "Width of the rendered images in pixels [default: 1000]",
        value_parser = value_parser!(u32).range(1..=10000)
    )]
    pub width: Option<u32>,

    #[arg(
        long,
        help = "Height of the rendered images in pixels [default: 500]",
        value_parser = value_parser!(u32).range(1..=10000)
    )]
    pub height: Option<u32>,

    #[arg(
        long,
        help = "Number of whole days shown in the report [default: 1]",
        value_parser = value_parser!(u32).range(1..=3660)
    )]
    pub days: Option<u32>,

    #[arg(
        long,
        help = "Let the report end this many days before today, for sources that lag behind [default: 0]"
    )]
    pub offset_days: Option<u32>,

    #[arg(
        long,
        help = "Explicit window start in epoch milliseconds, overrides --days",
        requires = "to",
        allow_negative_numbers = true
    )]
    pub from: Option<i64>,

    #[arg(
        long,
        help = "Explicit window end in epoch milliseconds, overrides --days",
        requires = "from",
        allow_negative_numbers = true
    )]
    pub to: Option<i64>,

    #[arg(short = 's', long, help = "Subject of the report mail [default: Grafana Report]")]
    pub subject: Option<String>,

    #[arg(long, help = "Text shown above the images")]
    pub intro: Option<String>,

    #[arg(
        short = 'c',
        long,
        help = "Maximum number of concurrent render requests [default: all at once]",
        value_parser = value_parser!(u8).range(1..=100)
    )]
    pub concurrency_limit: Option<u8>,

    #[arg(
        long,
        help = "Abort when rendering all images takes longer than this many seconds",
        value_parser = value_parser!(u64).range(1..)
    )]
    pub deadline: Option<u64>,

    #[arg(
        short = 'w',
        long,
        help = "Directory the images are stored in until the mail is sent, used by this run only [default: a private directory under the system temp dir]",
        value_hint = ValueHint::DirPath,
        value_parser = validate_work_dir_str
    )]
    pub work_dir: Option<PathBuf>,

    #[arg(long, help = "Do not send the report if any panel failed to render")]
    pub strict: bool,

    #[arg(short = 'k', long, help = "Accept invalid TLS certificates from the Grafana server")]
    pub insecure: bool,

    #[arg(long, help = "Custom User-Agent header to be used in requests")]
    pub user_agent: Option<String>,

    #[arg(long, help = "Print the render summary as JSON to stdout")]
    pub json: bool,

    #[arg(
        long,
        help = "Path to a TOML config file [default: ./.panelmail.toml if present]",
        value_hint = ValueHint::FilePath,
        value_parser = clap::value_parser!(PathBuf)
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'v', long, action = ArgAction::Count, help = "Increase log verbosity (-v, -vv)")]
    pub verbose: u8,
}

impl Cli {
    /// Fills every option not given on the command line from the config
    /// file. Config values go through the same validation as CLI values.
    pub fn apply_config(&mut self, config: &ConfigFile) -> Result<(), Error> {
        fn fill<T>(target: &mut Option<T>, value: Option<T>) {
            if target.is_none() {
                *target = value;
            }
        }

        fn validated<T>(
            value: &Option<String>,
            parse: fn(&str) -> Result<T, String>,
        ) -> Result<Option<T>, Error> {
            value
                .as_deref()
                .map(parse)
                .transpose()
                .map_err(Error::InvalidArgument)
        }

        fill(&mut self.mail_from, validated(&config.mail_from, parse_mailbox)?);
        if self.mail_to.is_empty() {
            self.mail_to = config
                .mail_to
                .iter()
                .map(|m| parse_mailbox(m))
                .collect::<Result<_, _>>()
                .map_err(Error::InvalidArgument)?;
        }
        fill(&mut self.mailhost, validated(&config.mailhost, SmtpSettings::parse)?);
        self.smtp_starttls |= config.smtp_starttls.unwrap_or(false);
        fill(&mut self.smtp_user, config.smtp_user.clone());
        fill(&mut self.smtp_password, config.smtp_password.clone());
        fill(&mut self.grafana_server, validated(&config.grafana_server, parse_server)?);
        fill(&mut self.api_token, config.api_token.clone());
        fill(&mut self.basic_auth, validated(&config.basic_auth, validate_basic_auth)?);

        // The panel selection is taken as a whole: either the command line
        // selects panels or the config file does.
        if self.dashboard.is_none() && self.panels.is_empty() {
            self.dashboard = validated(&config.dashboard, parse_dashboard)?;
            self.panels = config
                .panels
                .iter()
                .map(|p| parse_panel(p))
                .collect::<Result<_, _>>()
                .map_err(Error::InvalidArgument)?;
            self.whole_dashboard |= config.whole_dashboard.unwrap_or(false);
        }

        fill(&mut self.width, config.width);
        fill(&mut self.height, config.height);
        fill(&mut self.days, config.days);
        fill(&mut self.offset_days, config.offset_days);
        fill(&mut self.subject, config.subject.clone());
        fill(&mut self.intro, config.intro.clone());
        fill(&mut self.concurrency_limit, config.concurrency_limit);
        fill(&mut self.deadline, config.deadline);
        fill(&mut self.work_dir, validated(&config.work_dir, validate_work_dir_str)?);
        self.strict |= config.strict.unwrap_or(false);
        self.insecure |= config.insecure.unwrap_or(false);
        fill(&mut self.user_agent, config.user_agent.clone());

        if matches!(self.concurrency_limit, Some(0) | Some(101..)) {
            return Err(Error::invalid("concurrency_limit must be between 1 and 100"));
        }
        if self.days == Some(0) {
            return Err(Error::invalid("days must be at least 1"));
        }
        if matches!(self.width, Some(0)) || matches!(self.height, Some(0)) {
            return Err(Error::invalid("width and height must be at least 1"));
        }
        if self.deadline == Some(0) {
            return Err(Error::invalid("deadline must be at least 1 second"));
        }
        Ok(())
    }

    pub fn selection(&self) -> Result<Selection, Error> {
        if let Some(dashboard) = &self.dashboard {
            if self.whole_dashboard && !self.panels.is_empty() {
                return Err(Error::invalid("--whole-dashboard cannot be combined with --panel"));
            }
            let panel_ids = self
                .panels
                .iter()
                .map(|p| match p {
                    PanelArg::Id(id) => Ok(id.clone()),
                    PanelArg::Qualified(r) => Err(Error::invalid(format!(
                        "panel '{}' must be a plain panel id when --dashboard is given",
                        r
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Selection::Dashboard {
                id: dashboard.id.clone(),
                slug: dashboard.slug.clone(),
                panel_ids,
                whole: self.whole_dashboard,
            });
        }

        if self.panels.is_empty() {
            return Err(Error::invalid("either --dashboard or --panel is required"));
        }
        self.panels
            .iter()
            .map(|p| match p {
                PanelArg::Qualified(request) => Ok(request.clone()),
                PanelArg::Id(id) => Err(Error::invalid(format!(
                    "panel id '{}' needs --dashboard, or use 'dashId,slug,panelId'",
                    id
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Selection::Panels)
    }

    pub fn sender(&self) -> Result<Mailbox, Error> {
        match &self.mail_from {
            Some(sender) => Ok(sender.clone()),
            None => parse_mailbox(defaults::MAIL_FROM).map_err(Error::InvalidArgument),
        }
    }

    pub fn recipients(&self) -> Result<Vec<Mailbox>, Error> {
        if self.mail_to.is_empty() {
            return Err(Error::invalid("at least one recipient (--mail-to) is required"));
        }
        Ok(self.mail_to.clone())
    }

    pub fn smtp(&self) -> Result<SmtpSettings, Error> {
        let mut settings = self
            .mailhost
            .clone()
            .ok_or_else(|| Error::invalid("a mail relay (--mailhost) is required"))?;
        settings.starttls = self.smtp_starttls;
        settings.credentials = match (&self.smtp_user, &self.smtp_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (Some(_), None) => {
                return Err(Error::invalid("--smtp-user requires --smtp-password"));
            }
            _ => None,
        };
        Ok(settings)
    }

    pub fn credential(&self) -> Option<Credential> {
        match (&self.basic_auth, &self.api_token) {
            (Some(auth), _) => Some(Credential::Basic(auth.clone())),
            (None, Some(token)) if !token.is_empty() => Some(Credential::Bearer(token.clone())),
            _ => None,
        }
    }

    pub fn endpoint(&self, work_dir: &Path) -> Result<Endpoint, Error> {
        let base_url = self
            .grafana_server
            .clone()
            .ok_or_else(|| Error::invalid("the Grafana server (--grafana-server) is required"))?;
        Ok(Endpoint::new(base_url, work_dir)
            .with_credential(self.credential())
            .with_size(
                self.width.unwrap_or(defaults::WIDTH),
                self.height.unwrap_or(defaults::HEIGHT),
            ))
    }

    /// The `--work-dir` if given, else a private directory for this run.
    pub fn work_dir(&self) -> Result<WorkDir, Error> {
        Ok(WorkDir::create(self.work_dir.as_deref())?)
    }

    /// The report window: explicit `--from`/`--to`, or whole days before `today`.
    pub fn window(&self, today: NaiveDate) -> Result<TimeWindow, Error> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => TimeWindow::new(from, to),
            (None, None) => TimeWindow::trailing_days(
                today,
                self.days.unwrap_or(defaults::DAYS),
                self.offset_days.unwrap_or(0),
            ),
            _ => Err(Error::invalid("--from and --to must be given together")),
        }
    }

    pub fn subject(&self) -> &str {
        self.subject.as_deref().unwrap_or(defaults::SUBJECT)
    }

    pub fn intro(&self) -> &str {
        self.intro.as_deref().unwrap_or(defaults::INTRO)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            concurrency_limit: self.concurrency_limit.map(usize::from),
            deadline: self.deadline.map(Duration::from_secs),
            show_progress: !self.json,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| defaults::USER_AGENT.to_string()),
            accept_invalid_certs: self.insecure,
        }
    }
}

/// Options read from a TOML config file. Keys match the long CLI flags with
/// underscores.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub mail_from: Option<String>,
    #[serde(default)]
    pub mail_to: Vec<String>,
    pub mailhost: Option<String>,
    pub smtp_starttls: Option<bool>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub grafana_server: Option<String>,
    pub api_token: Option<String>,
    pub basic_auth: Option<String>,
    pub dashboard: Option<String>,
    #[serde(default)]
    pub panels: Vec<String>,
    pub whole_dashboard: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub days: Option<u32>,
    pub offset_days: Option<u32>,
    pub subject: Option<String>,
    pub intro: Option<String>,
    pub concurrency_limit: Option<u8>,
    pub deadline: Option<u64>,
    pub work_dir: Option<String>,
    pub strict: Option<bool>,
    pub insecure: Option<bool>,
    pub user_agent: Option<String>,
}

impl ConfigFile {
    /// Loads the config from an explicit path (which must exist), or from
    /// `.panelmail.toml` in the working directory if there is one.
    pub fn load(path: Option<&PathBuf>) -> Result<Self, String> {
        let path = match path {
            Some(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
                if !expanded.is_file() {
                    return Err(format!("Config file not found: {}", expanded.display()));
                }
                expanded
            }
            None => {
                let default = PathBuf::from(defaults::CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("Invalid config file {}: {}", path.display(), e))
    }
}
