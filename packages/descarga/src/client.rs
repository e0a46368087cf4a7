//! Bulk download client: authentication, request submission, polling and
//! package download.

use chrono::Utc;

use crate::config::ClientConfig;
use crate::credential::Credential;
use crate::error::Result;
use crate::keys::{load_signing_key, SigningKey};
use crate::lifecycle::{DownloadRequest, RequestParams, Verification};
use crate::session::AuthManager;
use crate::signer::{sign_timestamp, SecurityTimestamp};
use crate::soap;
use crate::transport::{HttpTransport, Operation, ReqwestTransport, SoapTransport};

/// Client for the SAT bulk download service.
///
/// Every call is synchronous. The session token is cached and shared, so one
/// client can serve several threads.
#[derive(Debug)]
pub struct DescargaClient<T: HttpTransport = ReqwestTransport> {
    credential: Credential,
    key: SigningKey,
    config: ClientConfig,
    transport: SoapTransport<T>,
    auth: AuthManager,
}

impl DescargaClient<ReqwestTransport> {
    /// Client over HTTPS.
    ///
    /// # Errors
    /// `KeyFormat` or `KeySignCapability` when the credential's key is
    /// unusable, `Config` when the HTTP client cannot be built.
    pub fn new(credential: Credential, config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Self::with_transport(credential, config, transport)
    }
}

impl<T: HttpTransport> DescargaClient<T> {
    /// Client over a caller-provided transport.
    pub fn with_transport(
        credential: Credential,
        config: ClientConfig,
        transport: T,
    ) -> Result<Self> {
        let key = load_signing_key(credential.private_key(), credential.passphrase())?;
        tracing::debug!(rfc = credential.rfc(), bits = key.bits(), "Client ready");

        Ok(Self {
            transport: SoapTransport::new(transport, &config.transport),
            auth: AuthManager::new(config.token_lifetime, config.token_safety_margin),
            credential,
            key,
            config,
        })
    }

    /// Requester RFC.
    pub fn rfc(&self) -> &str {
        self.credential.rfc()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        self.transport.inner()
    }

    /// A valid session token, from cache or from a fresh signed exchange.
    ///
    /// # Errors
    /// `Authentication` on a fault or a response without a token;
    /// `Transport` when the service cannot be reached.
    pub fn authenticate(&self) -> Result<String> {
        self.auth.token_with(|| self.request_token())
    }

    /// Forget the cached token so the next call re-authenticates.
    pub fn invalidate_token(&self) {
        self.auth.invalidate();
    }

    fn request_token(&self) -> Result<String> {
        let timestamp = SecurityTimestamp::now(self.config.timestamp_window)?;
        let signed = sign_timestamp(&self.key, &timestamp)?;
        let token_id = soap::security_token_id(&signed.correlation_id);
        let certificate = self.credential.certificate_base64();
        let envelope = soap::authentication_envelope(&signed, &certificate, &token_id);

        tracing::info!(rfc = self.rfc(), "Authenticating");
        let body = self.call_text(Operation::Authenticate, envelope, None)?;
        soap::parse_auth_response(&body)
    }

    fn call_text(
        &self,
        operation: Operation,
        envelope: String,
        token: Option<&str>,
    ) -> Result<String> {
        let body = self
            .transport
            .call(operation, &self.config.endpoints, envelope, token)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Submit a download request and return its `IdSolicitud`.
    ///
    /// # Errors
    /// `InvalidDateRange`/`InvalidRfc` before anything is sent;
    /// `RequestCreation` when the service refuses or garbles the answer.
    pub fn create_request(&self, params: &RequestParams) -> Result<String> {
        params.validate()?;
        let token = self.authenticate()?;

        tracing::info!(
            start = %params.start,
            end = %params.end,
            kind = params.kind.as_str(),
            "Submitting download request"
        );
        let envelope = soap::request_envelope(self.rfc(), params);
        let body = self.call_text(Operation::CreateRequest, envelope, Some(&token))?;
        let id = soap::parse_create_response(&body)?;
        tracing::info!(request_id = %id, "Download request accepted");
        Ok(id)
    }

    /// Submit a download request and track it from `Submitted`.
    pub fn submit(&self, params: RequestParams) -> Result<DownloadRequest> {
        let id = self.create_request(&params)?;
        Ok(DownloadRequest::submitted(id, params))
    }

    /// Poll the status of a request.
    pub fn verify_request(&self, request_id: &str) -> Result<Verification> {
        let token = self.authenticate()?;
        let envelope = soap::verify_envelope(self.rfc(), request_id);
        let body = self.call_text(Operation::VerifyRequest, envelope, Some(&token))?;
        let verification = soap::parse_verify_response(&body)?;

        tracing::info!(
            request_id,
            status = %verification.status,
            cfdis = verification.cfdi_count,
            packages = verification.package_ids.len(),
            "Request verified"
        );
        Ok(verification)
    }

    /// Poll `request` and record the result on it.
    pub fn refresh(&self, request: &mut DownloadRequest) -> Result<()> {
        let verification = self.verify_request(&request.id)?;
        request.apply(verification)
    }

    /// Download one package as raw zip bytes.
    ///
    /// # Errors
    /// `PackageDownload` on a fault or an empty result,
    /// `InvalidPackageFormat` when the result is not a zip archive.
    pub fn download_package(&self, package_id: &str) -> Result<Vec<u8>> {
        let token = self.authenticate()?;
        let envelope = soap::download_envelope(self.rfc(), package_id);
        let body = self.transport.call(
            Operation::DownloadPackage,
            &self.config.endpoints,
            envelope,
            Some(&token),
        )?;

        let package = soap::parse_download_response(body, package_id)?;
        tracing::info!(package_id, bytes = package.len(), "Package downloaded");
        Ok(package)
    }

    /// Whether a valid token is cached.
    pub fn token_is_cached(&self) -> bool {
        self.auth.cached(Utc::now()).is_some()
    }
}
