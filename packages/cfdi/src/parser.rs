//! CFDI parsing entry points.

use roxmltree::{Document, Node};

use crate::classify::{classify, ClassificationInput, TYPE_PAYMENT};
use crate::error::Result;
use crate::payments::{extract_payment_complement, find_pagos};
use crate::regime::regime_label;
use crate::taxes::extract_tax_totals;
use crate::types::{Party, SchemaVersion, TaxDocumentRecord};
use crate::xml::{
    attr, attr_f64, attr_opt, find_child_ns, find_children_ns, find_descendant_by_name,
    find_descendant_ns, get_tag_name, TFD_NS,
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Separator between concept descriptions.
pub const CONCEPT_SEPARATOR: &str = " | ";

/// Parse raw CFDI bytes and build a record relative to `own_rfc`.
///
/// A UTF-8 byte order mark is tolerated. Invalid UTF-8 is decoded lossily
/// with a warning.
///
/// # Returns
/// `Ok(None)` for well-formed XML that is not a supported CFDI
///
/// # Errors
/// Returns an error only when the input is not well-formed XML.
pub fn parse_xml(bytes: &[u8], own_rfc: &str) -> Result<Option<TaxDocumentRecord>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => std::borrow::Cow::Borrowed(text),
        Err(e) => {
            tracing::warn!(error = %e, "CFDI is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(bytes)
        }
    };

    let doc = Document::parse(&text)?;
    Ok(parse_document(&doc, own_rfc))
}

/// Detect the schema version of a parsed document.
///
/// The root must be a `Comprobante` in the namespace matching its
/// `Version` attribute.
#[must_use]
pub fn detect_version(doc: &Document<'_>) -> Option<SchemaVersion> {
    let root = doc.root_element();
    if get_tag_name(root) != "Comprobante" {
        tracing::debug!(root = get_tag_name(root), "root is not a Comprobante");
        return None;
    }

    let raw = attr(root, &["Version", "version"]);
    let Some(version) = SchemaVersion::from_attribute(&raw) else {
        tracing::warn!(version = %raw, "unsupported CFDI version");
        return None;
    };

    if root.tag_name().namespace() != Some(version.namespace()) {
        tracing::warn!(
            version = version.as_str(),
            namespace = root.tag_name().namespace().unwrap_or_default(),
            "Comprobante namespace does not match its version"
        );
        return None;
    }

    Some(version)
}

/// Build a record from a parsed document.
///
/// Returns `None` when the document is not a CFDI 3.3 or 4.0. Missing
/// optional nodes default to empty strings or zero.
#[must_use]
pub fn parse_document(doc: &Document<'_>, own_rfc: &str) -> Option<TaxDocumentRecord> {
    let version = detect_version(doc)?;
    let comprobante = doc.root_element();
    let ns = Some(version.namespace());

    let emisor = find_child_ns(comprobante, ns, "Emisor");
    let receptor = find_child_ns(comprobante, ns, "Receptor");

    let issuer = Party {
        name: attr_opt(emisor, &["Nombre", "nombre"]),
        rfc: attr_opt(emisor, &["Rfc", "rfc"]),
        regime: label_for(&attr_opt(emisor, &["RegimenFiscal", "regimenFiscal"])),
    };
    let receiver = Party {
        name: attr_opt(receptor, &["Nombre", "nombre"]),
        rfc: attr_opt(receptor, &["Rfc", "rfc"]),
        regime: match version {
            SchemaVersion::V40 => label_for(&attr_opt(receptor, &["RegimenFiscalReceptor"])),
            SchemaVersion::V33 => String::new(),
        },
    };

    let document_type = attr(comprobante, &["TipoDeComprobante", "tipoDeComprobante"]);
    let has_payment_complement = find_pagos(comprobante).is_some();

    let role = classify(
        &ClassificationInput {
            issuer_rfc: &issuer.rfc,
            receiver_rfc: &receiver.rfc,
            document_type: &document_type,
            has_payment_complement,
        },
        own_rfc,
    );

    let payment_complement = if has_payment_complement || document_type == TYPE_PAYMENT {
        extract_payment_complement(comprobante)
    } else {
        None
    };

    let record = TaxDocumentRecord {
        version,
        role,
        folio: attr(comprobante, &["Folio", "folio"]),
        fiscal_uuid: fiscal_uuid(comprobante),
        date: attr(comprobante, &["Fecha", "fecha"]).chars().take(10).collect(),
        payment_form: attr(comprobante, &["FormaPago", "formaPago"]),
        payment_method: attr(comprobante, &["MetodoPago", "metodoPago"]),
        use_of_cfdi: attr_opt(receptor, &["UsoCFDI", "usoCFDI"]),
        concepts: concept_summary(comprobante, version),
        subtotal: attr_f64(comprobante, &["SubTotal", "subTotal"], 0.0),
        discount: attr_f64(comprobante, &["Descuento", "descuento"], 0.0),
        taxes: extract_tax_totals(comprobante, version),
        total: attr_f64(comprobante, &["Total", "total"], 0.0),
        currency: attr(comprobante, &["Moneda", "moneda"]),
        exchange_rate: attr_f64(comprobante, &["TipoCambio", "tipoCambio"], 1.0),
        document_type,
        issuer,
        receiver,
        payment_complement,
    };

    tracing::debug!(
        uuid = %record.fiscal_uuid,
        role = record.role.as_str(),
        "parsed CFDI"
    );

    Some(record)
}

fn label_for(code: &str) -> String {
    if code.is_empty() {
        String::new()
    } else {
        regime_label(code)
    }
}

/// UUID of the fiscal stamp, falling back to any `TimbreFiscalDigital`
/// element when the stamp namespace is not declared as expected.
fn fiscal_uuid(comprobante: Node<'_, '_>) -> String {
    let stamp = find_descendant_ns(comprobante, Some(TFD_NS), "TimbreFiscalDigital")
        .or_else(|| find_descendant_by_name(comprobante, "TimbreFiscalDigital"));
    attr_opt(stamp, &["UUID", "uuid"])
}

fn concept_summary(comprobante: Node<'_, '_>, version: SchemaVersion) -> String {
    let ns = Some(version.namespace());
    let Some(conceptos) = find_child_ns(comprobante, ns, "Conceptos") else {
        return String::new();
    };

    find_children_ns(conceptos, ns, "Concepto")
        .map(|concepto| attr(concepto, &["Descripcion", "descripcion"]))
        .filter(|description| !description.is_empty())
        .collect::<Vec<_>>()
        .join(CONCEPT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentRole;
    use pretty_assertions::assert_eq;

    const OWN: &str = "GOGR810728TV5";

    fn invoice(version: &str, ns: &str, receiver: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="{ns}" xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital"
    Version="{version}" Folio="77" Fecha="2024-01-31T10:20:30" SubTotal="100" Total="116"
    Moneda="MXN" TipoDeComprobante="I" FormaPago="03" MetodoPago="PUE">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="Proveedor" RegimenFiscal="601"/>
  <cfdi:Receptor Rfc="{receiver}" Nombre="Cliente" UsoCFDI="G03" RegimenFiscalReceptor="612"/>
  <cfdi:Conceptos>
    <cfdi:Concepto Descripcion="Servicio A"/>
    <cfdi:Concepto Descripcion=""/>
    <cfdi:Concepto Descripcion="Servicio B"/>
  </cfdi:Conceptos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital UUID="11111111-2222-3333-4444-555555555555"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#
        )
    }

    #[test]
    fn test_parse_v40_expense() {
        let xml = invoice("4.0", "http://www.sat.gob.mx/cfd/4", OWN);
        let record = parse_xml(xml.as_bytes(), OWN).unwrap().unwrap();

        assert_eq!(record.version, SchemaVersion::V40);
        assert_eq!(record.role, DocumentRole::Expense);
        assert_eq!(record.folio, "77");
        assert_eq!(record.date, "2024-01-31");
        assert_eq!(record.fiscal_uuid, "11111111-2222-3333-4444-555555555555");
        assert_eq!(record.concepts, "Servicio A | Servicio B");
        assert_eq!(record.issuer.regime, "General de Ley Personas Morales");
        assert_eq!(
            record.receiver.regime,
            "Personas Físicas con Actividades Empresariales y Profesionales"
        );
        assert_eq!(record.use_of_cfdi, "G03");
        assert_eq!(record.exchange_rate, 1.0);
        assert!(record.payment_complement.is_none());
    }

    #[test]
    fn test_receiver_regime_only_in_v40() {
        let xml = invoice("3.3", "http://www.sat.gob.mx/cfd/3", "XAXX010101000");
        let record = parse_xml(xml.as_bytes(), OWN).unwrap().unwrap();

        assert_eq!(record.version, SchemaVersion::V33);
        assert_eq!(record.role, DocumentRole::Income);
        assert_eq!(record.receiver.regime, "");
    }

    #[test]
    fn test_bom_is_tolerated() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(invoice("4.0", "http://www.sat.gob.mx/cfd/4", OWN).as_bytes());
        assert!(parse_xml(&bytes, OWN).unwrap().is_some());
    }

    #[test]
    fn test_unsupported_version_is_none() {
        let xml = invoice("1.0", "http://www.sat.gob.mx/cfd/4", OWN);
        assert!(parse_xml(xml.as_bytes(), OWN).unwrap().is_none());
    }

    #[test]
    fn test_namespace_mismatch_is_none() {
        let xml = invoice("4.0", "http://www.sat.gob.mx/cfd/3", OWN);
        assert!(parse_xml(xml.as_bytes(), OWN).unwrap().is_none());
    }

    #[test]
    fn test_non_cfdi_root_is_none() {
        assert!(parse_xml(b"<Factura/>", OWN).unwrap().is_none());
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse_xml(b"<cfdi:Comprobante", OWN).is_err());
    }

    #[test]
    fn test_uuid_fallback_without_tfd_namespace() {
        let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
                xmlns:x="urn:other" Version="4.0" TipoDeComprobante="I">
            <cfdi:Complemento><x:TimbreFiscalDigital UUID="abc"/></cfdi:Complemento>
        </cfdi:Comprobante>"#;
        let record = parse_xml(xml.as_bytes(), OWN).unwrap().unwrap();
        assert_eq!(record.fiscal_uuid, "abc");
    }
}
