//! SOAP envelopes and response parsing for the four service operations.
//!
//! Only the authentication envelope is signed. The other three carry the
//! session token in the `Authorization` header instead.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use roxmltree::{Document, Node};

use crate::error::{DescargaError, Result};
use crate::lifecycle::{RequestParams, RequestStatus, Verification};
use crate::signer::{signed_info_xml, timestamp_xml, SignedTimestamp};

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const X509_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
const BASE64_ENCODING: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
const DIAGNOSTICS_NS: &str = "http://schemas.microsoft.com/2004/09/ServiceModel/Diagnostics";
const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const AUTH_SERVICE_NS: &str = "http://DescargaMasivaTerceros.gob.mx";
const DOWNLOAD_SERVICE_NS: &str = "http://DescargaMasivaTerceros.sat.gob.mx";

/// Fallback text for faults without `faultstring` or `detail`.
const UNKNOWN_FAULT: &str = "unknown service fault";

/// Escape a value for use inside a double-quoted XML attribute.
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// `u:Id` of the `BinarySecurityToken` for a correlation id.
pub fn security_token_id(uuid: &uuid::Uuid) -> String {
    format!("uuid-{uuid}-4")
}

/// Signed authentication envelope.
///
/// The timestamp and `SignedInfo` are embedded byte for byte as they were
/// hashed and signed.
pub fn authentication_envelope(
    signed: &SignedTimestamp,
    certificate_base64: &str,
    token_id: &str,
) -> String {
    format!(
        concat!(
            r#"<s:Envelope xmlns:s="{envelope}" xmlns:u="{wsu}">"#,
            r#"<s:Header>"#,
            r#"<ActivityId CorrelationId="{correlation}" xmlns="{diagnostics}">00000000-0000-0000-0000-000000000000</ActivityId>"#,
            r#"<o:Security s:mustUnderstand="1" xmlns:o="{wsse}">"#,
            "{timestamp}",
            r#"<o:BinarySecurityToken u:Id="{token_id}" ValueType="{x509}" EncodingType="{base64}">{certificate}</o:BinarySecurityToken>"#,
            r#"<Signature xmlns="{xmldsig}">"#,
            "{signed_info}",
            r#"<SignatureValue>{signature}</SignatureValue>"#,
            r##"<KeyInfo><o:SecurityTokenReference><o:Reference ValueType="{x509}" URI="#{token_id}"/></o:SecurityTokenReference></KeyInfo>"##,
            r#"</Signature>"#,
            r#"</o:Security>"#,
            r#"</s:Header>"#,
            r#"<s:Body><Autentica xmlns="{auth_ns}"/></s:Body>"#,
            r#"</s:Envelope>"#,
        ),
        envelope = ENVELOPE_NS,
        wsu = WSU_NS,
        correlation = signed.correlation_id,
        diagnostics = DIAGNOSTICS_NS,
        wsse = WSSE_NS,
        timestamp = timestamp_xml(&signed.created, &signed.expires),
        token_id = token_id,
        x509 = X509_TOKEN_TYPE,
        base64 = BASE64_ENCODING,
        certificate = certificate_base64,
        xmldsig = XMLDSIG_NS,
        signed_info = signed_info_xml(&signed.digest_value),
        signature = signed.signature_value,
        auth_ns = AUTH_SERVICE_NS,
    )
}

fn service_envelope(body: &str) -> String {
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="{ENVELOPE_NS}" xmlns:des="{DOWNLOAD_SERVICE_NS}" xmlns:xd="{XMLDSIG_NS}"><soapenv:Header/><soapenv:Body>{body}</soapenv:Body></soapenv:Envelope>"#
    )
}

/// Download request submission (`SolicitaDescarga`).
///
/// The period covers whole days: from 00:00:00.000 on the start date to
/// 23:59:59.000 on the end date.
pub fn request_envelope(requester_rfc: &str, params: &RequestParams) -> String {
    let mut attributes = format!(
        r#"RfcSolicitante="{}" FechaInicial="{}T00:00:00.000" FechaFinal="{}T23:59:59.000" TipoSolicitud="{}""#,
        escape_attr(requester_rfc),
        params.start.format("%Y-%m-%d"),
        params.end.format("%Y-%m-%d"),
        params.kind.as_str(),
    );
    if let Some(issuer) = &params.issuer {
        attributes.push_str(&format!(r#" RfcEmisor="{}""#, escape_attr(issuer)));
    }
    if let Some(receiver) = &params.receiver {
        attributes.push_str(&format!(r#" RfcReceptor="{}""#, escape_attr(receiver)));
    }

    service_envelope(&format!(
        "<des:SolicitaDescarga><des:solicitud {attributes}></des:solicitud></des:SolicitaDescarga>"
    ))
}

/// Verification poll (`VerificaSolicitudDescarga`).
pub fn verify_envelope(requester_rfc: &str, request_id: &str) -> String {
    service_envelope(&format!(
        r#"<des:VerificaSolicitudDescarga><des:solicitud IdSolicitud="{}" RfcSolicitante="{}"></des:solicitud></des:VerificaSolicitudDescarga>"#,
        escape_attr(request_id),
        escape_attr(requester_rfc),
    ))
}

/// Package download (`Descargar`).
pub fn download_envelope(requester_rfc: &str, package_id: &str) -> String {
    service_envelope(&format!(
        r#"<des:Descargar><des:peticionDescarga IdPaquete="{}" RfcSolicitante="{}"></des:peticionDescarga></des:Descargar>"#,
        escape_attr(package_id),
        escape_attr(requester_rfc),
    ))
}

/// First element (in document order) whose local name matches `name`,
/// ignoring ASCII case and namespace.
fn find_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case(name))
}

fn element_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn attribute(node: Node<'_, '_>, name: &str) -> String {
    node.attribute(name).unwrap_or_default().trim().to_string()
}

/// Fault text of a SOAP fault document, if it is one.
pub fn fault_string(doc: &Document<'_>) -> Option<String> {
    let fault = find_element(doc.root_element(), "Fault")?;
    let text = ["faultstring", "detail"]
        .iter()
        .filter_map(|name| find_element(fault, name))
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| UNKNOWN_FAULT.to_string());
    Some(text)
}

/// Fault text of a raw response body, if it parses as a SOAP fault.
pub fn fault_from_bytes(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    let doc = Document::parse(text).ok()?;
    fault_string(&doc)
}

/// Parse `text` and reject SOAP faults, mapping both to `error`.
fn parse_response<'input>(
    text: &'input str,
    error: fn(String) -> DescargaError,
) -> Result<Document<'input>> {
    let doc = Document::parse(text).map_err(|e| error(format!("malformed response: {e}")))?;
    if let Some(fault) = fault_string(&doc) {
        return Err(error(format!("SOAP fault: {fault}")));
    }
    Ok(doc)
}

/// Extract the token from an `AutenticaResponse`.
pub fn parse_auth_response(text: &str) -> Result<String> {
    let doc = parse_response(text, DescargaError::Authentication)?;
    let result = find_element(doc.root_element(), "AutenticaResult").ok_or_else(|| {
        DescargaError::Authentication("response has no AutenticaResult".into())
    })?;

    let token = element_text(result);
    if token.is_empty() {
        return Err(DescargaError::Authentication(
            "AutenticaResult is empty".into(),
        ));
    }
    Ok(token)
}

/// Extract `IdSolicitud` from a `SolicitaDescargaResponse`.
pub fn parse_create_response(text: &str) -> Result<String> {
    let doc = parse_response(text, DescargaError::RequestCreation)?;
    let result = find_element(doc.root_element(), "SolicitaDescargaResult").ok_or_else(|| {
        DescargaError::RequestCreation("response has no SolicitaDescargaResult".into())
    })?;

    let id = attribute(result, "IdSolicitud");
    if id.is_empty() {
        return Err(DescargaError::RequestCreation(format!(
            "no IdSolicitud (CodEstatus {}: {})",
            attribute(result, "CodEstatus"),
            attribute(result, "Mensaje"),
        )));
    }
    Ok(id)
}

/// Parse a `VerificaSolicitudDescargaResponse`.
///
/// A missing or non-numeric `EstadoSolicitud` maps to `Unknown(0)`.
pub fn parse_verify_response(text: &str) -> Result<Verification> {
    let doc = parse_response(text, DescargaError::RequestVerification)?;
    let result = find_element(doc.root_element(), "VerificaSolicitudDescargaResult")
        .ok_or_else(|| {
            DescargaError::RequestVerification(
                "response has no VerificaSolicitudDescargaResult".into(),
            )
        })?;

    let code = attribute(result, "EstadoSolicitud").parse().unwrap_or(0);
    let package_ids = result
        .children()
        .filter(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("IdsPaquetes"))
        .map(element_text)
        .filter(|id| !id.is_empty())
        .collect();

    Ok(Verification {
        status: RequestStatus::from_code(code),
        status_code: attribute(result, "CodigoEstadoSolicitud"),
        message: attribute(result, "Mensaje"),
        cfdi_count: attribute(result, "NumeroCFDIs").parse().unwrap_or(0),
        package_ids,
    })
}

const ZIP_MAGIC: &[u8] = b"PK";

/// Turn a download response into the raw package bytes.
///
/// The body is either the archive itself or a SOAP envelope carrying it
/// base64-encoded in `Paquete`.
///
/// # Errors
/// `PackageDownload` for faults, envelopes without a package and empty
/// results; `InvalidPackageFormat` when the result is not a zip archive.
pub fn parse_download_response(body: Vec<u8>, package_id: &str) -> Result<Vec<u8>> {
    let package = if body.starts_with(ZIP_MAGIC) {
        body
    } else if looks_like_xml(&body) {
        decode_package_envelope(&body)?
    } else {
        body
    };

    if package.is_empty() {
        return Err(DescargaError::PackageDownload(format!(
            "package {package_id} is empty"
        )));
    }
    if !package.starts_with(ZIP_MAGIC) {
        return Err(DescargaError::InvalidPackageFormat {
            package_id: package_id.to_string(),
        });
    }
    Ok(package)
}

fn looks_like_xml(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

fn decode_package_envelope(body: &[u8]) -> Result<Vec<u8>> {
    let text = String::from_utf8_lossy(body);
    let doc = parse_response(&text, DescargaError::PackageDownload)?;
    let root = doc.root_element();

    let encoded = find_element(root, "Paquete")
        .map(element_text)
        .unwrap_or_default();
    if encoded.is_empty() {
        let (code, message) = find_element(root, "respuesta")
            .map(|r| (attribute(r, "CodEstatus"), attribute(r, "Mensaje")))
            .unwrap_or_default();
        return Err(DescargaError::PackageDownload(format!(
            "response carries no package (CodEstatus {code}: {message})"
        )));
    }

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| DescargaError::PackageDownload(format!("package is not valid base64: {e}")))
}
