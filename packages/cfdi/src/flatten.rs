//! Legacy flat export.
//!
//! Spreadsheet reports consume one flat row per document, with repeated
//! payment structures spread into indexed columns (`FECHA_PAGO_1`,
//! `ID_DOCUMENTO_1_2`, `TRASLADO_002_BASE_DR_1_1`, ...). Column order
//! follows the order in which the structures appear in the document.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::{
    Payment, PaymentComplement, RelatedDocument, TaxCategory, TaxDocumentRecord, TaxEntry,
};

/// A single cell of a flat row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FlatValue {
    Text(String),
    Number(f64),
}

impl From<&str> for FlatValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FlatValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FlatValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// An ordered set of named columns.
///
/// Setting an existing column overwrites it in place, keeping its original
/// position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    columns: Vec<(String, FlatValue)>,
}

impl FlatRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FlatValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&FlatValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlatValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Flatten a record into the legacy column layout.
#[must_use]
pub fn flatten(record: &TaxDocumentRecord) -> FlatRecord {
    let mut row = FlatRecord::new();

    row.set("VERSION_CFDI", record.version.as_str());
    row.set("TIPO_DOCUMENTO", record.role.as_str());
    row.set("FOLIO", record.folio.as_str());
    row.set("FOLIO_FISCAL", record.fiscal_uuid.as_str());
    row.set("FECHA_CFDI", record.date.as_str());
    row.set("NOMBRE_EMISOR", record.issuer.name.as_str());
    row.set("RFC_EMISOR", record.issuer.rfc.as_str());
    row.set("FORMA_DE_PAGO", record.payment_form.as_str());
    row.set("METODO_DE_PAGO", record.payment_method.as_str());
    row.set("REGIMEN_RECEPTOR", record.receiver.regime.as_str());
    row.set("CONCEPTO", record.concepts.as_str());
    row.set("SUBTOTAL", record.subtotal);
    row.set("DESCUENTO", record.discount);
    row.set("IVA", record.taxes.vat);
    row.set("IEPS", record.taxes.excise);
    row.set("IMPUESTO_LOCAL", record.taxes.local);
    row.set("RETENCION_ISR", record.taxes.withheld_isr);
    row.set("RETENCION_IVA", record.taxes.withheld_vat);
    row.set("TOTAL", record.total);
    row.set("MONEDA", record.currency.as_str());
    row.set("TIPO_DE_CAMBIO", record.exchange_rate);
    row.set("USO_DE_CFDI", record.use_of_cfdi.as_str());
    row.set("NOMBRE_RECEPTOR", record.receiver.name.as_str());
    row.set("RFC_RECEPTOR", record.receiver.rfc.as_str());
    row.set("REGIMEN_EMISOR", record.issuer.regime.as_str());

    if let Some(complement) = &record.payment_complement {
        flatten_complement(&mut row, complement);
    }

    row
}

fn flatten_complement(row: &mut FlatRecord, complement: &PaymentComplement) {
    row.set("VERSION_PAGOS", complement.version.as_str());
    row.set("TOTAL_RETENCIONES_IVA", complement.totals.withheld_vat);
    row.set("TOTAL_RETENCIONES_ISR", complement.totals.withheld_isr);
    row.set(
        "TOTAL_TRASLADOS_BASE_IVA16",
        complement.totals.transferred_base_vat16,
    );
    row.set(
        "TOTAL_TRASLADOS_IMPUESTO_IVA16",
        complement.totals.transferred_vat16,
    );

    for (i, payment) in complement.payments.iter().enumerate() {
        let index = (i + 1).to_string();
        flatten_payment(row, payment, &index);

        for (j, docto) in payment.related_documents.iter().enumerate() {
            flatten_related_document(row, docto, &format!("{index}_{}", j + 1));
        }
    }
}

fn flatten_payment(row: &mut FlatRecord, payment: &Payment, i: &str) {
    row.set(format!("FECHA_PAGO_{i}"), payment.date.as_str());
    row.set(format!("FORMA_DE_PAGO_{i}"), payment.form.as_str());
    row.set(format!("MONEDA_PAGO_{i}"), payment.currency.as_str());
    row.set(format!("MONTO_PAGO_{i}"), payment.amount);
    row.set(format!("TIPO_CAMBIO_PAGO_{i}"), payment.exchange_rate);
    row.set(format!("NUM_OPERACION_{i}"), payment.operation_number.as_str());
    row.set(format!("RFC_EMISOR_CTA_ORD_{i}"), payment.ordering_rfc.as_str());
    row.set(
        format!("NOMBRE_BANCO_ORD_EXT_{i}"),
        payment.ordering_bank_name.as_str(),
    );
    row.set(format!("CTA_ORDENANTE_{i}"), payment.ordering_account.as_str());
    row.set(
        format!("RFC_EMISOR_CTA_BEN_{i}"),
        payment.beneficiary_rfc.as_str(),
    );
    row.set(
        format!("CTA_BENEFICIARIO_{i}"),
        payment.beneficiary_account.as_str(),
    );
    flatten_taxes(row, &payment.taxes, &format!("PAGO_{i}"));
}

fn flatten_related_document(row: &mut FlatRecord, docto: &RelatedDocument, ij: &str) {
    row.set(format!("ID_DOCUMENTO_{ij}"), docto.id.as_str());
    row.set(format!("SERIE_DR_{ij}"), docto.series.as_str());
    row.set(format!("FOLIO_DR_{ij}"), docto.folio.as_str());
    row.set(format!("IMP_SALDO_ANT_{ij}"), docto.prior_balance);
    row.set(format!("IMP_PAGADO_{ij}"), docto.amount_paid);
    row.set(format!("IMP_SALDO_INSOLUTO_{ij}"), docto.remaining_balance);
    row.set(format!("OBJETO_IMP_DR_{ij}"), docto.tax_object.as_str());
    row.set(format!("EQUIVALENCIA_DR_{ij}"), docto.equivalence);
    flatten_taxes(row, &docto.taxes, &format!("DR_{ij}"));
}

/// Withheld entries contribute only their amount; transferred entries
/// contribute base, rate and amount. Repeated codes overwrite earlier ones.
fn flatten_taxes(row: &mut FlatRecord, taxes: &[TaxEntry], suffix: &str) {
    for tax in taxes {
        let prefix = format!("{}_{}", tax.category.as_str(), tax.tax_code);
        match tax.category {
            TaxCategory::Withheld => {
                row.set(format!("{prefix}_{suffix}"), tax.amount);
            }
            TaxCategory::Transferred => {
                row.set(format!("{prefix}_BASE_{suffix}"), tax.base);
                row.set(format!("{prefix}_TASA_{suffix}"), tax.rate.as_str());
                row.set(format!("{prefix}_IMPORTE_{suffix}"), tax.amount);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_xml;
    use pretty_assertions::assert_eq;

    const PAYMENT: &str = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
            xmlns:pago20="http://www.sat.gob.mx/Pagos20" Version="4.0" TipoDeComprobante="P"
            SubTotal="0" Total="0" Moneda="XXX">
        <cfdi:Emisor Rfc="GOGR810728TV5" Nombre="Yo" RegimenFiscal="612"/>
        <cfdi:Receptor Rfc="AAA010101AAA" Nombre="Cliente" UsoCFDI="CP01" RegimenFiscalReceptor="601"/>
        <cfdi:Complemento>
            <pago20:Pagos Version="2.0">
                <pago20:Totales TotalTrasladosBaseIVA16="100" TotalTrasladosImpuestoIVA16="16"/>
                <pago20:Pago FechaPago="2024-03-01T12:00:00" FormaDePagoP="03" MonedaP="MXN" Monto="116">
                    <pago20:DoctoRelacionado IdDocumento="D1" ImpPagado="116" ObjetoImpDR="02">
                        <pago20:ImpuestosDR><pago20:RetencionesDR>
                            <pago20:RetencionDR ImpuestoDR="001" ImporteDR="10"/>
                        </pago20:RetencionesDR></pago20:ImpuestosDR>
                    </pago20:DoctoRelacionado>
                    <pago20:ImpuestosP><pago20:TrasladosP>
                        <pago20:TrasladoP BaseP="100" ImpuestoP="002" TasaOCuotaP="0.160000" ImporteP="16"/>
                    </pago20:TrasladosP></pago20:ImpuestosP>
                </pago20:Pago>
            </pago20:Pagos>
        </cfdi:Complemento>
    </cfdi:Comprobante>"#;

    #[test]
    fn test_flat_columns_for_payment_complement() {
        let record = parse_xml(PAYMENT.as_bytes(), "GOGR810728TV5")
            .unwrap()
            .unwrap();
        let row = flatten(&record);

        assert_eq!(
            row.get("TIPO_DOCUMENTO"),
            Some(&FlatValue::from("ComplementoPagoEmitido"))
        );
        assert_eq!(row.get("VERSION_PAGOS"), Some(&FlatValue::from("2.0")));
        assert_eq!(
            row.get("TOTAL_TRASLADOS_IMPUESTO_IVA16"),
            Some(&FlatValue::Number(16.0))
        );
        assert_eq!(row.get("MONTO_PAGO_1"), Some(&FlatValue::Number(116.0)));
        assert_eq!(
            row.get("TRASLADO_002_TASA_PAGO_1"),
            Some(&FlatValue::from("0.160000"))
        );
        assert_eq!(
            row.get("TRASLADO_002_BASE_PAGO_1"),
            Some(&FlatValue::Number(100.0))
        );
        assert_eq!(row.get("ID_DOCUMENTO_1_1"), Some(&FlatValue::from("D1")));
        assert_eq!(
            row.get("RETENCION_001_DR_1_1"),
            Some(&FlatValue::Number(10.0))
        );
        assert_eq!(row.get("EQUIVALENCIA_DR_1_1"), Some(&FlatValue::Number(1.0)));
    }

    #[test]
    fn test_column_order_is_preserved_in_json() {
        let record = parse_xml(PAYMENT.as_bytes(), "GOGR810728TV5")
            .unwrap()
            .unwrap();
        let json = serde_json::to_string(&flatten(&record)).unwrap();

        let version = json.find("\"VERSION_CFDI\"").unwrap();
        let regime = json.find("\"REGIMEN_EMISOR\"").unwrap();
        let payment = json.find("\"FECHA_PAGO_1\"").unwrap();
        assert!(version < regime && regime < payment);
        assert!(json.starts_with("{\"VERSION_CFDI\":\"4.0\""));
    }

    #[test]
    fn test_invoice_has_no_payment_columns() {
        let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
            Version="4.0" TipoDeComprobante="I"/>"#;
        let record = parse_xml(xml.as_bytes(), "GOGR810728TV5").unwrap().unwrap();
        let row = flatten(&record);

        assert_eq!(row.len(), 25);
        assert!(row.get("VERSION_PAGOS").is_none());
        assert_eq!(row.iter().next().map(|(name, _)| name), Some("VERSION_CFDI"));
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut row = FlatRecord::new();
        row.set("A", 1.0);
        row.set("B", "x");
        row.set("A", 2.0);

        let names: Vec<_> = row.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(row.get("A"), Some(&FlatValue::Number(2.0)));
    }
}
