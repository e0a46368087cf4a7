//! End-to-end tests for CFDI parsing and classification.
//!
//! Fixtures cover both comprobante generations and both payment complement
//! generations, seen from the point of view of taxpayer GOGR810728TV5.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use sat_cfdi::{
    flatten, parse_xml, DocumentRole, FlatValue, PaymentsVersion, SchemaVersion, TaxCategory,
    TaxDocumentRecord, TaxTotals,
};

const OWN_RFC: &str = "GOGR810728TV5";

/// Load fixture file content.
fn load_fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

fn parse_fixture(name: &str) -> TaxDocumentRecord {
    parse_xml(&load_fixture(name), OWN_RFC)
        .expect("fixture should be well-formed")
        .expect("fixture should be a supported CFDI")
}

#[test]
fn test_expense_invoice_v40() {
    let record = parse_fixture("expense_40.xml");

    assert_eq!(record.version, SchemaVersion::V40);
    assert_eq!(record.role, DocumentRole::Expense);
    assert_eq!(record.fiscal_uuid, "6F5B1C2D-0A3E-4B7F-9C11-2D3E4F5A6B7C");
    assert_eq!(record.date, "2024-02-14");
    assert_eq!(record.issuer.rfc, "EKU9003173C9");
    assert_eq!(record.receiver.regime, "Régimen Simplificado de Confianza");
    assert_eq!(
        record.concepts,
        "Licencia de software | Hospedaje en zona fronteriza | Bebida saborizada"
    );
    assert_eq!(
        record.taxes,
        TaxTotals {
            vat: 24.0,
            excise: 24.0,
            local: 3.0,
            withheld_isr: 0.0,
            withheld_vat: 0.0,
        }
    );
    assert_eq!(record.subtotal, 300.0);
    assert_eq!(record.total, 351.0);
}

#[test]
fn test_income_invoice_v40_with_withholdings() {
    let record = parse_fixture("income_40.xml");

    assert_eq!(record.role, DocumentRole::Income);
    assert_eq!(record.currency, "USD");
    assert_eq!(record.exchange_rate, 17.05);
    assert_eq!(record.taxes.vat, 160.0);
    assert_eq!(record.taxes.withheld_isr, 100.0);
    assert_eq!(record.taxes.withheld_vat, 106.67);
    assert_eq!(
        record.issuer.regime,
        "Personas Físicas con Actividades Empresariales y Profesionales"
    );
}

#[test]
fn test_v33_invoice_uses_document_level_taxes() {
    let record = parse_fixture("invoice_33.xml");

    assert_eq!(record.version, SchemaVersion::V33);
    assert_eq!(record.role, DocumentRole::Expense);
    assert_eq!(record.taxes.vat, 80.0);
    assert_eq!(record.issuer.regime, "Incorporación Fiscal");
    assert_eq!(record.receiver.regime, "");
    assert_eq!(record.exchange_rate, 1.0);
}

#[test]
fn test_payment_complement_v20_received() {
    let record = parse_fixture("payment_20_received.xml");

    assert_eq!(record.role, DocumentRole::PaymentComplementReceived);

    let complement = record.payment_complement.as_ref().unwrap();
    assert_eq!(complement.version, PaymentsVersion::V20);
    assert_eq!(complement.totals.total_paid, 232.0);
    assert_eq!(complement.payments.len(), 2);

    let first = &complement.payments[0];
    assert_eq!(first.operation_number, "000123");
    assert_eq!(first.ordering_rfc, "BBA830831LJ2");
    assert_eq!(first.taxes.len(), 1);
    assert_eq!(first.taxes[0].category, TaxCategory::Transferred);
    assert_eq!(first.related_documents[0].remaining_balance, 116.0);
    assert_eq!(first.related_documents[0].taxes[0].base, 100.0);

    let second = &complement.payments[1];
    assert!(second.taxes.is_empty());
    assert_eq!(second.related_documents[0].installment, "2");
}

#[test]
fn test_payment_complement_v10_issued() {
    let record = parse_fixture("payment_10_issued.xml");

    assert_eq!(record.role, DocumentRole::PaymentComplementIssued);

    let complement = record.payment_complement.as_ref().unwrap();
    assert_eq!(complement.version, PaymentsVersion::V10);
    assert_eq!(complement.payments[0].exchange_rate, 20.10);
    assert_eq!(complement.payments[0].related_documents[0].folio, "88");
}

#[test]
fn test_payment_complement_direction_follows_requester() {
    let bytes = load_fixture("payment_20_received.xml");

    let as_receiver = parse_xml(&bytes, OWN_RFC).unwrap().unwrap();
    let as_issuer = parse_xml(&bytes, "EKU9003173C9").unwrap().unwrap();

    assert_eq!(as_receiver.role, DocumentRole::PaymentComplementReceived);
    assert_eq!(as_issuer.role, DocumentRole::PaymentComplementIssued);
}

#[test]
fn test_unsupported_version_is_skipped() {
    let result = parse_xml(&load_fixture("legacy_10.xml"), OWN_RFC).unwrap();
    assert!(result.is_none());
}

#[test]
fn test_flat_export_of_payment_complement() {
    let row = flatten(&parse_fixture("payment_20_received.xml"));

    assert_eq!(
        row.get("TIPO_DOCUMENTO"),
        Some(&FlatValue::Text("ComplementoPagoRecibido".into()))
    );
    assert_eq!(row.get("MONTO_PAGO_2"), Some(&FlatValue::Number(116.0)));
    assert_eq!(
        row.get("ID_DOCUMENTO_2_1"),
        Some(&FlatValue::Text(
            "6F5B1C2D-0A3E-4B7F-9C11-2D3E4F5A6B7C".into()
        ))
    );
    assert_eq!(
        row.get("TRASLADO_002_IMPORTE_DR_1_1"),
        Some(&FlatValue::Number(16.0))
    );
    assert!(row.get("TRASLADO_002_IMPORTE_DR_2_1").is_none());
}
