//! Configuration constants, input validation and client configuration.

use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{DescargaError, Result};

/// Authentication endpoint.
pub const AUTH_URL: &str =
    "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/Autenticacion/Autenticacion.svc";

/// Download request submission endpoint.
pub const REQUEST_URL: &str =
    "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/SolicitaDescargaService.svc";

/// Download request verification endpoint.
pub const VERIFY_URL: &str =
    "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/VerificaSolicitudDescargaService.svc";

/// Package download endpoint.
pub const DOWNLOAD_URL: &str =
    "https://cfdidescargamasiva.clouda.sat.gob.mx/DescargaMasivaService.svc";

pub const AUTH_ACTION: &str = "http://DescargaMasivaTerceros.gob.mx/IAutenticacion/Autentica";
pub const REQUEST_ACTION: &str =
    "http://DescargaMasivaTerceros.sat.gob.mx/ISolicitaDescargaService/SolicitaDescarga";
pub const VERIFY_ACTION: &str =
    "http://DescargaMasivaTerceros.sat.gob.mx/IVerificaSolicitudDescargaService/VerificaSolicitudDescarga";
pub const DOWNLOAD_ACTION: &str =
    "http://DescargaMasivaTerceros.sat.gob.mx/IDescargaMasivaTercerosService/Descargar";

/// Maximum number of attempts per SOAP call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 3;

/// Per-call HTTP timeout.
///
/// Package downloads of several megabytes are common, hence the generous value.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Lifetime assumed for a freshly issued token.
///
/// The service issues tokens valid for five minutes; four leaves room for
/// clock skew between us and the service.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 240;

/// A cached token is not reused within this margin of its expiry.
pub const DEFAULT_TOKEN_SAFETY_MARGIN_SECS: u64 = 5;

/// Validity window of the signed security timestamp.
pub const DEFAULT_TIMESTAMP_WINDOW_SECS: u64 = 300;

/// RFC pattern: 3 (legal entity) or 4 (individual) letters, birth or
/// incorporation date, 3 homoclave characters.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static RFC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z&Ñ]{3,4}\d{6}[A-Z\d]{3}$").expect("valid regex"));

/// Date pattern: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Validate an RFC (taxpayer id).
///
/// # Examples
/// ```
/// use sat_descarga::config::validate_rfc;
///
/// assert!(validate_rfc("GOGR810728TV5").is_ok());
/// assert!(validate_rfc("EKU9003173C9").is_ok());
/// assert!(validate_rfc("gogr810728tv5").is_err());
/// ```
pub fn validate_rfc(rfc: &str) -> Result<()> {
    if RFC_PATTERN.is_match(rfc) {
        Ok(())
    } else {
        Err(DescargaError::InvalidRfc(rfc.to_string()))
    }
}

/// Validate and parse a calendar date (YYYY-MM-DD).
///
/// # Examples
/// ```
/// use sat_descarga::config::validate_date;
///
/// assert!(validate_date("2024-02-29").is_ok());
/// assert!(validate_date("2023-02-29").is_err());
/// assert!(validate_date("2024-2-1").is_err());
/// ```
pub fn validate_date(date_str: &str) -> Result<NaiveDate> {
    if !DATE_PATTERN.is_match(date_str) {
        return Err(DescargaError::InvalidDate(date_str.to_string()));
    }
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| DescargaError::InvalidDate(date_str.to_string()))
}

/// URLs of the four service endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub authenticate: String,
    pub create_request: String,
    pub verify_request: String,
    pub download: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            authenticate: AUTH_URL.to_string(),
            create_request: REQUEST_URL.to_string(),
            verify_request: VERIFY_URL.to_string(),
            download: DOWNLOAD_URL.to_string(),
        }
    }
}

impl ServiceEndpoints {
    /// All four services behind one base URL, with the production paths.
    ///
    /// Used to point the client at a local mock or a proxy.
    pub fn at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            authenticate: format!("{base}/Autenticacion/Autenticacion.svc"),
            create_request: format!("{base}/SolicitaDescargaService.svc"),
            verify_request: format!("{base}/VerificaSolicitudDescargaService.svc"),
            download: format!("{base}/DescargaMasivaService.svc"),
        }
    }
}

/// Retry and timeout policy for SOAP calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Everything the client needs besides the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoints: ServiceEndpoints,
    pub transport: TransportConfig,
    pub token_lifetime: Duration,
    pub token_safety_margin: Duration,
    pub timestamp_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: ServiceEndpoints::default(),
            transport: TransportConfig::default(),
            token_lifetime: Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS),
            token_safety_margin: Duration::from_secs(DEFAULT_TOKEN_SAFETY_MARGIN_SECS),
            timestamp_window: Duration::from_secs(DEFAULT_TIMESTAMP_WINDOW_SECS),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `SAT_*` environment variables.
    ///
    /// Recognized: `SAT_MAX_ATTEMPTS`, `SAT_RETRY_DELAY_SECS`,
    /// `SAT_TIMEOUT_SECS`, `SAT_TOKEN_LIFETIME_SECS`, `SAT_AUTH_URL`,
    /// `SAT_REQUEST_URL`, `SAT_VERIFY_URL`, `SAT_DOWNLOAD_URL`.
    ///
    /// # Errors
    /// Returns `Config` when a numeric variable does not parse or
    /// `SAT_MAX_ATTEMPTS` is zero.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(max_attempts) = parse_var::<u32>(&lookup, "SAT_MAX_ATTEMPTS")? {
            if max_attempts == 0 {
                return Err(DescargaError::Config(
                    "SAT_MAX_ATTEMPTS must be at least 1".into(),
                ));
            }
            config.transport.max_attempts = max_attempts;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SAT_RETRY_DELAY_SECS")? {
            config.transport.retry_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SAT_TIMEOUT_SECS")? {
            config.transport.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SAT_TOKEN_LIFETIME_SECS")? {
            config.token_lifetime = Duration::from_secs(secs);
        }

        let endpoints = &mut config.endpoints;
        for (name, slot) in [
            ("SAT_AUTH_URL", &mut endpoints.authenticate),
            ("SAT_REQUEST_URL", &mut endpoints.create_request),
            ("SAT_VERIFY_URL", &mut endpoints.verify_request),
            ("SAT_DOWNLOAD_URL", &mut endpoints.download),
        ] {
            if let Some(url) = lookup(name).filter(|v| !v.trim().is_empty()) {
                *slot = url;
            }
        }

        Ok(config)
    }

    pub fn with_endpoints(mut self, endpoints: ServiceEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.transport.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.transport.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = timeout;
        self
    }

    pub fn with_token_lifetime(mut self, token_lifetime: Duration) -> Self {
        self.token_lifetime = token_lifetime;
        self
    }

    pub fn with_token_safety_margin(mut self, margin: Duration) -> Self {
        self.token_safety_margin = margin;
        self
    }

    pub fn with_timestamp_window(mut self, window: Duration) -> Self {
        self.timestamp_window = window;
        self
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DescargaError::Config(format!("{name} is not a valid number: '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_validate_rfc() {
        assert!(validate_rfc("GOGR810728TV5").is_ok());
        assert!(validate_rfc("EKU9003173C9").is_ok());
        assert!(validate_rfc("ÑOÑO800101AB1").is_ok());
        assert!(validate_rfc("&AB800101AB1").is_ok());
        assert!(validate_rfc("GOGR810728TV").is_err());
        assert!(validate_rfc("GOGR8107281TV5").is_err());
        assert!(validate_rfc("").is_err());
    }

    #[test]
    fn test_validate_date() {
        assert_eq!(
            validate_date("2024-01-31").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
        );
        assert!(validate_date("2024-13-01").is_err());
        assert!(validate_date("31/01/2024").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(config.transport.retry_delay, Duration::from_secs(3));
        assert_eq!(config.transport.timeout, Duration::from_secs(60));
        assert_eq!(config.token_lifetime, Duration::from_secs(240));
        assert_eq!(config.endpoints.authenticate, AUTH_URL);
    }

    #[test]
    fn test_endpoints_at_base_url() {
        let endpoints = ServiceEndpoints::at("http://127.0.0.1:9000/");
        assert_eq!(
            endpoints.authenticate,
            "http://127.0.0.1:9000/Autenticacion/Autenticacion.svc"
        );
        assert_eq!(
            endpoints.download,
            "http://127.0.0.1:9000/DescargaMasivaService.svc"
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SAT_MAX_ATTEMPTS", "5"),
            ("SAT_RETRY_DELAY_SECS", "0"),
            ("SAT_VERIFY_URL", "http://localhost/verify"),
        ]))
        .unwrap();

        assert_eq!(config.transport.max_attempts, 5);
        assert_eq!(config.transport.retry_delay, Duration::ZERO);
        assert_eq!(config.endpoints.verify_request, "http://localhost/verify");
        assert_eq!(config.endpoints.authenticate, AUTH_URL);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(ClientConfig::from_lookup(lookup(&[("SAT_TIMEOUT_SECS", "soon")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("SAT_MAX_ATTEMPTS", "0")])).is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = ClientConfig::default()
            .with_max_attempts(1)
            .with_retry_delay(Duration::from_millis(10))
            .with_token_lifetime(Duration::from_secs(60));

        assert_eq!(config.transport.max_attempts, 1);
        assert_eq!(config.transport.retry_delay, Duration::from_millis(10));
        assert_eq!(config.token_lifetime, Duration::from_secs(60));
    }
}
