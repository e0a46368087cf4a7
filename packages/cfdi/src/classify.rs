//! Document role classification.
//!
//! The requester's RFC is the pivot: a document is "received" when the
//! requester is its receiver and "issued" when the requester is its issuer.

use crate::types::DocumentRole;

/// `TipoDeComprobante` code for income invoices.
pub const TYPE_INCOME: &str = "I";

/// `TipoDeComprobante` code for payment complements.
pub const TYPE_PAYMENT: &str = "P";

/// The facts classification depends on.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub issuer_rfc: &'a str,
    pub receiver_rfc: &'a str,
    pub document_type: &'a str,

    /// A Pagos 1.0/2.0 block was found in the document.
    pub has_payment_complement: bool,
}

/// Compare two RFCs, ignoring surrounding whitespace and ASCII case.
///
/// An empty RFC never matches.
#[must_use]
pub fn rfc_matches(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Classify a document relative to `own_rfc`.
///
/// A payment complement that names neither party as the requester falls back
/// to [`DocumentRole::PaymentComplementReceived`]. That fallback is kept for
/// compatibility with existing reports; it is not a confirmed business rule.
///
/// # Examples
/// ```
/// use sat_cfdi::classify::{classify, ClassificationInput};
/// use sat_cfdi::DocumentRole;
///
/// let input = ClassificationInput {
///     issuer_rfc: "AAA010101AAA",
///     receiver_rfc: "BBB010101BBB",
///     document_type: "I",
///     has_payment_complement: false,
/// };
/// assert_eq!(classify(&input, "BBB010101BBB"), DocumentRole::Expense);
/// assert_eq!(classify(&input, "AAA010101AAA"), DocumentRole::Income);
/// ```
#[must_use]
pub fn classify(input: &ClassificationInput<'_>, own_rfc: &str) -> DocumentRole {
    if input.has_payment_complement || input.document_type == TYPE_PAYMENT {
        if rfc_matches(input.receiver_rfc, own_rfc) {
            return DocumentRole::PaymentComplementReceived;
        }
        if rfc_matches(input.issuer_rfc, own_rfc) {
            return DocumentRole::PaymentComplementIssued;
        }
        tracing::debug!(
            issuer = input.issuer_rfc,
            receiver = input.receiver_rfc,
            "payment complement matches neither party, treating as received"
        );
        return DocumentRole::PaymentComplementReceived;
    }

    if input.document_type != TYPE_INCOME {
        return DocumentRole::Unclassified;
    }

    if rfc_matches(input.receiver_rfc, own_rfc) {
        DocumentRole::Expense
    } else {
        DocumentRole::Income
    }
}
