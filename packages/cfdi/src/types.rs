//! Core data types for parsed CFDI documents.
//!
//! A [`TaxDocumentRecord`] is the normalized form of one CFDI. Repeated
//! structures of the payment complement are kept as ordered, nested lists;
//! the legacy flat column layout lives in [`crate::flatten`].

use serde::Serialize;

use crate::xml::{CFDI_33_NS, CFDI_40_NS, PAGOS_10_NS, PAGOS_20_NS};

/// Supported comprobante schema generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SchemaVersion {
    /// CFDI 3.3.
    #[serde(rename = "3.3")]
    V33,

    /// CFDI 4.0.
    #[serde(rename = "4.0")]
    V40,
}

impl SchemaVersion {
    /// Parse the comprobante `Version` attribute.
    ///
    /// Returns `None` for every generation this crate does not extract.
    ///
    /// # Examples
    /// ```
    /// use sat_cfdi::SchemaVersion;
    ///
    /// assert_eq!(SchemaVersion::from_attribute("4.0"), Some(SchemaVersion::V40));
    /// assert_eq!(SchemaVersion::from_attribute("3.2"), None);
    /// ```
    #[must_use]
    pub fn from_attribute(value: &str) -> Option<Self> {
        match value.trim() {
            "3.3" => Some(Self::V33),
            "4.0" => Some(Self::V40),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V33 => "3.3",
            Self::V40 => "4.0",
        }
    }

    /// Namespace URI of the comprobante elements for this generation.
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::V33 => CFDI_33_NS,
            Self::V40 => CFDI_40_NS,
        }
    }
}

/// Payment complement generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PaymentsVersion {
    /// Pagos 1.0, paired with CFDI 3.3.
    #[serde(rename = "1.0")]
    V10,

    /// Pagos 2.0, paired with CFDI 4.0.
    #[serde(rename = "2.0")]
    V20,
}

impl PaymentsVersion {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V10 => "1.0",
            Self::V20 => "2.0",
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::V10 => PAGOS_10_NS,
            Self::V20 => PAGOS_20_NS,
        }
    }
}

/// Role of a document from the point of view of the requesting taxpayer.
///
/// Serialized with the labels used by the spreadsheet exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocumentRole {
    /// Invoice issued by the taxpayer.
    #[serde(rename = "Ingreso")]
    Income,

    /// Invoice received by the taxpayer.
    #[serde(rename = "Gasto")]
    Expense,

    /// Payment complement issued by the taxpayer.
    #[serde(rename = "ComplementoPagoEmitido")]
    PaymentComplementIssued,

    /// Payment complement received by the taxpayer.
    #[serde(rename = "ComplementoPagoRecibido")]
    PaymentComplementReceived,

    /// Anything else (credit notes, payroll, transfers...).
    #[serde(rename = "Desconocido")]
    Unclassified,
}

impl DocumentRole {
    /// Label used in exported reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "Ingreso",
            Self::Expense => "Gasto",
            Self::PaymentComplementIssued => "ComplementoPagoEmitido",
            Self::PaymentComplementReceived => "ComplementoPagoRecibido",
            Self::Unclassified => "Desconocido",
        }
    }

    #[must_use]
    pub fn is_payment_complement(&self) -> bool {
        matches!(
            self,
            Self::PaymentComplementIssued | Self::PaymentComplementReceived
        )
    }
}

/// Whether a tax entry is transferred to or withheld from the counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    /// Traslado.
    Transferred,

    /// Retención.
    Withheld,
}

impl TaxCategory {
    /// Prefix used for flat export column names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transferred => "TRASLADO",
            Self::Withheld => "RETENCION",
        }
    }
}

/// SAT tax code for income tax (ISR).
pub const TAX_ISR: &str = "001";

/// SAT tax code for value added tax (IVA).
pub const TAX_IVA: &str = "002";

/// SAT tax code for excise tax (IEPS).
pub const TAX_IEPS: &str = "003";

/// One tax line of a payment or of a related document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxEntry {
    pub category: TaxCategory,

    /// SAT tax code (`001`, `002`, `003`).
    pub tax_code: String,

    /// Taxable base; zero when the schema omits it.
    pub base: f64,

    /// Factor type (`Tasa`, `Cuota`, `Exento`).
    pub factor_type: String,

    /// Rate or quota, kept verbatim (`0.160000`).
    pub rate: String,

    pub amount: f64,
}

/// A previously issued invoice settled by a payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedDocument {
    /// Fiscal UUID of the settled invoice.
    pub id: String,
    pub series: String,
    pub folio: String,
    pub currency: String,
    pub installment: String,
    pub prior_balance: f64,
    pub amount_paid: f64,
    pub remaining_balance: f64,

    /// `ObjetoImpDR` (Pagos 2.0 only).
    pub tax_object: String,

    /// `EquivalenciaDR` (Pagos 2.0 only, default 1).
    pub equivalence: f64,

    pub taxes: Vec<TaxEntry>,
}

/// One payment entry of a payment complement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub date: String,

    /// `FormaDePagoP` catalog code.
    pub form: String,
    pub currency: String,
    pub amount: f64,
    pub exchange_rate: f64,
    pub operation_number: String,
    pub ordering_rfc: String,
    pub ordering_bank_name: String,
    pub ordering_account: String,
    pub beneficiary_rfc: String,
    pub beneficiary_account: String,
    pub taxes: Vec<TaxEntry>,
    pub related_documents: Vec<RelatedDocument>,
}

/// Complement-level totals (Pagos 2.0 `Totales`; zero for Pagos 1.0).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentTotals {
    pub withheld_vat: f64,
    pub withheld_isr: f64,
    pub withheld_ieps: f64,
    pub transferred_base_vat16: f64,
    pub transferred_vat16: f64,
    pub transferred_base_vat8: f64,
    pub transferred_vat8: f64,
    pub transferred_base_vat0: f64,
    pub transferred_vat0: f64,
    pub transferred_base_vat_exempt: f64,
    pub total_paid: f64,
}

/// Payment complement (Pagos) content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentComplement {
    pub version: PaymentsVersion,
    pub totals: PaymentTotals,
    pub payments: Vec<Payment>,
}

/// Aggregated tax amounts of a comprobante.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxTotals {
    /// Transferred IVA (`002`).
    pub vat: f64,

    /// Transferred IEPS (`003`).
    pub excise: f64,

    /// Local transferred taxes (implocal).
    pub local: f64,

    /// Withheld ISR (`001`).
    pub withheld_isr: f64,

    /// Withheld IVA (`002`).
    pub withheld_vat: f64,
}

/// Issuer or receiver of a comprobante.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Party {
    pub name: String,
    pub rfc: String,

    /// Human-readable fiscal regime label; empty when the schema has none.
    pub regime: String,
}

/// Normalized record of one CFDI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxDocumentRecord {
    pub version: SchemaVersion,
    pub role: DocumentRole,

    /// `TipoDeComprobante` code (`I`, `E`, `P`, ...).
    pub document_type: String,
    pub folio: String,
    pub fiscal_uuid: String,

    /// Issue date truncated to `YYYY-MM-DD`.
    pub date: String,
    pub issuer: Party,
    pub receiver: Party,
    pub payment_form: String,
    pub payment_method: String,
    pub use_of_cfdi: String,

    /// Concept descriptions joined with `" | "`.
    pub concepts: String,
    pub subtotal: f64,
    pub discount: f64,
    pub taxes: TaxTotals,
    pub total: f64,
    pub currency: String,
    pub exchange_rate: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_complement: Option<PaymentComplement>,
}
