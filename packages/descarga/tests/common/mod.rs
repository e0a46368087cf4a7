use std::path::PathBuf;
use std::time::Duration;

use sat_descarga::{ClientConfig, Credential, DescargaClient, ServiceEndpoints};

pub const RFC: &str = "GOGR810728TV5";
pub const PASSWORD: &str = "12345678a";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name))
        .unwrap_or_else(|e| panic!("Failed to read fixture {name}: {e}"))
}

pub fn credential() -> Credential {
    Credential::from_files(
        &fixture_path("certificate.cer"),
        &fixture_path("key_encrypted.key"),
        PASSWORD,
        RFC,
    )
    .expect("fixture credential")
}

/// A client pointed at `base_url` with no delay between retries.
pub fn client_at(base_url: &str, max_attempts: u32) -> DescargaClient {
    let config = ClientConfig::default()
        .with_endpoints(ServiceEndpoints::at(base_url))
        .with_max_attempts(max_attempts)
        .with_retry_delay(Duration::ZERO)
        .with_timeout(Duration::from_secs(5));
    DescargaClient::new(credential(), config).expect("client creation")
}

pub fn auth_response(token: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" xmlns:u="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><s:Header><o:Security s:mustUnderstand="1" xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"><u:Timestamp u:Id="_0"><u:Created>2024-01-01T00:00:00.000Z</u:Created><u:Expires>2024-01-01T00:05:00.000Z</u:Expires></u:Timestamp></o:Security></s:Header><s:Body><AutenticaResponse xmlns="http://DescargaMasivaTerceros.gob.mx"><AutenticaResult>{token}</AutenticaResult></AutenticaResponse></s:Body></s:Envelope>"#
    )
}

pub fn create_response(id: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema"><SolicitaDescargaResponse xmlns="http://DescargaMasivaTerceros.sat.gob.mx"><SolicitaDescargaResult IdSolicitud="{id}" RfcSolicitante="{RFC}" CodEstatus="5000" Mensaje="Solicitud Aceptada"/></SolicitaDescargaResponse></s:Body></s:Envelope>"#
    )
}

pub fn verify_response(state: u32, packages: &[&str]) -> String {
    let ids: String = packages
        .iter()
        .map(|id| format!("<IdsPaquetes>{id}</IdsPaquetes>"))
        .collect();
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><VerificaSolicitudDescargaResponse xmlns="http://DescargaMasivaTerceros.sat.gob.mx"><VerificaSolicitudDescargaResult CodEstatus="5000" EstadoSolicitud="{state}" CodigoEstadoSolicitud="5000" NumeroCFDIs="2" Mensaje="Solicitud Aceptada">{ids}</VerificaSolicitudDescargaResult></VerificaSolicitudDescargaResponse></s:Body></s:Envelope>"#
    )
}

pub fn fault(text: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring xml:lang="es-MX">{text}</faultstring></s:Fault></s:Body></s:Envelope>"#
    )
}
