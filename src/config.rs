//! Configuration for the detector and the diagnostic collector.

use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the detector is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// The order/checkout page.
    #[default]
    Checkout,
    /// Any other storefront page.
    Other,
}

/// Detector configuration, resolved once per page load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Show the fixed top banner on a blocked verdict.
    #[serde(default = "default_true")]
    pub show_banner: bool,

    /// Show the inline panel near the payment option.
    #[serde(default = "default_true")]
    pub show_inline: bool,

    /// Master switch; when off the detector never acts.
    #[serde(default = "default_true")]
    pub detect_blockers: bool,

    /// Only run on the checkout page.
    #[serde(default = "default_true")]
    pub checkout_only: bool,

    /// Verbose transition logging and diagnostic reporting.
    #[serde(default)]
    pub debug: bool,

    /// Support contact link shown next to the warnings.
    #[serde(default)]
    pub support_url: Option<String>,

    /// Message templates.
    #[serde(default)]
    pub messages: MessageConfig,

    /// Diagnostic report endpoint.
    #[serde(default)]
    pub diagnostic: DiagnosticEndpointConfig,

    /// Timing knobs.
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Shopper-facing message templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Shown by the page template when scripts are disabled entirely.
    #[serde(default = "default_js_disabled_message")]
    pub js_disabled: String,

    /// Fallback blocker message, used for providers without their own template.
    #[serde(default = "default_blocker_message")]
    pub blocker: String,

    /// Per-provider overrides of the blocked message, keyed by wire name.
    #[serde(default)]
    pub providers: BTreeMap<Provider, String>,
}

/// Endpoint the detector reports blocked diagnostics to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEndpointConfig {
    /// Collector URL.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Shared access token.
    #[serde(default)]
    pub token: Option<String>,
}

/// Timing configuration. All values are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Lower bound of the randomised first readiness check.
    #[serde(default = "default_first_check_min")]
    pub first_check_min_ms: u64,

    /// Upper bound (inclusive) of the randomised first readiness check.
    #[serde(default = "default_first_check_max")]
    pub first_check_max_ms: u64,

    /// Interval between readiness checks.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Time after which a missing widget is reported as blocked.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Delay before the "preparing" notice is shown.
    #[serde(default = "default_verifying_notice_delay")]
    pub verifying_notice_delay_ms: u64,

    /// Quiet period before a re-evaluation after mutations or choices.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Interval of the post-attach sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// How long the post-attach sweep keeps running.
    #[serde(default = "default_sweep_window")]
    pub sweep_window_ms: u64,

    /// Delay before verifying an option that was checked at attach time.
    #[serde(default = "default_preselect_delay")]
    pub preselect_delay_ms: u64,

    /// Clicks within this window of a pointer-down are ignored.
    #[serde(default = "default_click_dedup")]
    pub click_dedup_ms: u64,

    /// How long a widget that went missing after selection may stay missing
    /// before the re-verification reports it as blocked.
    #[serde(default = "default_timeout")]
    pub grace_period_ms: u64,

    /// How long the copy button shows its confirmation label.
    #[serde(default = "default_copied_label")]
    pub copied_label_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            show_banner: true,
            show_inline: true,
            detect_blockers: true,
            checkout_only: true,
            debug: false,
            support_url: None,
            messages: MessageConfig::default(),
            diagnostic: DiagnosticEndpointConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            js_disabled: default_js_disabled_message(),
            blocker: default_blocker_message(),
            providers: BTreeMap::new(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            first_check_min_ms: default_first_check_min(),
            first_check_max_ms: default_first_check_max(),
            retry_interval_ms: default_retry_interval(),
            timeout_ms: default_timeout(),
            verifying_notice_delay_ms: default_verifying_notice_delay(),
            debounce_ms: default_debounce(),
            sweep_interval_ms: default_sweep_interval(),
            sweep_window_ms: default_sweep_window(),
            preselect_delay_ms: default_preselect_delay(),
            click_dedup_ms: default_click_dedup(),
            grace_period_ms: default_timeout(),
            copied_label_ms: default_copied_label(),
        }
    }
}

impl TimingConfig {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry interval as a [`Duration`].
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Grace period as a [`Duration`].
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

const fn default_true() -> bool {
    true
}

const fn default_first_check_min() -> u64 {
    220
}

const fn default_first_check_max() -> u64 {
    400
}

const fn default_retry_interval() -> u64 {
    250
}

const fn default_timeout() -> u64 {
    4_500
}

const fn default_verifying_notice_delay() -> u64 {
    700
}

const fn default_debounce() -> u64 {
    250
}

const fn default_sweep_interval() -> u64 {
    800
}

const fn default_sweep_window() -> u64 {
    12_000
}

const fn default_preselect_delay() -> u64 {
    500
}

const fn default_click_dedup() -> u64 {
    260
}

const fn default_copied_label() -> u64 {
    1_200
}

fn default_js_disabled_message() -> String {
    "JavaScript is disabled in your browser. Enable it to pay for your order.".to_string()
}

fn default_blocker_message() -> String {
    "The payment form cannot be displayed: your browser, an extension (NoScript, AdBlock, \
     anti-tracker) or a security rule (CSP) is blocking scripts or frames required for payment \
     (Revolut / Stripe / PayPal). Allow them, then reload the page."
        .to_string()
}

impl DetectorConfig {
    /// Whether the detector should run on a page of the given kind.
    #[must_use]
    pub fn should_run_on(&self, page: PageKind) -> bool {
        self.detect_blockers && (!self.checkout_only || page == PageKind::Checkout)
    }

    /// Whether a diagnostic report may be sent.
    #[must_use]
    pub fn reporting_enabled(&self) -> bool {
        self.debug
            && self.diagnostic.endpoint_url.as_deref().is_some_and(|u| !u.is_empty())
            && self.diagnostic.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for inverted ranges, zero intervals,
    /// or an unparsable endpoint URL.
    pub fn validate(&self) -> crate::Result<()> {
        let t = &self.timing;
        if t.first_check_min_ms > t.first_check_max_ms {
            return Err(crate::Error::Config(format!(
                "first_check_min_ms ({}) exceeds first_check_max_ms ({})",
                t.first_check_min_ms, t.first_check_max_ms
            )));
        }
        if t.retry_interval_ms == 0 || t.sweep_interval_ms == 0 {
            return Err(crate::Error::Config(
                "retry and sweep intervals must be non-zero".to_string(),
            ));
        }
        if let Some(url) = self.diagnostic.endpoint_url.as_deref().filter(|u| !u.is_empty()) {
            url::Url::parse(url)
                .map_err(|e| crate::Error::Config(format!("invalid endpoint_url: {e}")))?;
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Diagnostic collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Request path accepting diagnostics.
    #[serde(default = "default_path")]
    pub path: String,

    /// Shared access token. Requests are refused while it is empty.
    #[serde(default)]
    pub token: String,

    /// Directory holding the stored diagnostic.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            token: String::new(),
            data_dir: default_data_dir(),
            max_body_bytes: default_max_body(),
            log_level: default_log_level(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8087))
}

fn default_path() -> String {
    "/diagnostic".to_string()
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "payguard")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".payguard"))
}

const fn default_max_body() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CollectorConfig {
    /// Path of the stored diagnostic file.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("last_diagnostic.json")
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
