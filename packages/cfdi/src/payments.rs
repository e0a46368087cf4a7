//! Payment complement (Pagos 1.0 / 2.0) extraction.
//!
//! Pagos 2.0 suffixes its tax element and attribute names with `P` at the
//! payment level and `DR` at the related-document level
//! (`ImpuestosP/TrasladosP/TrasladoP@ImporteP`). Both levels share one
//! extractor parameterized by that suffix. Pagos 1.0 carries no tax entries.

use roxmltree::Node;

use crate::types::{
    Payment, PaymentComplement, PaymentTotals, PaymentsVersion, RelatedDocument, TaxCategory,
    TaxEntry,
};
use crate::xml::{attr, attr_f64, find_child_ns, find_children_ns, find_descendant_ns};

/// Locate the `Pagos` element, preferring the 2.0 namespace.
#[must_use]
pub fn find_pagos<'a, 'input: 'a>(
    comprobante: Node<'a, 'input>,
) -> Option<(PaymentsVersion, Node<'a, 'input>)> {
    [PaymentsVersion::V20, PaymentsVersion::V10]
        .into_iter()
        .find_map(|version| {
            find_descendant_ns(comprobante, Some(version.namespace()), "Pagos")
                .map(|node| (version, node))
        })
}

/// Extract the payment complement of a comprobante, if it has one.
#[must_use]
pub fn extract_payment_complement(comprobante: Node<'_, '_>) -> Option<PaymentComplement> {
    let (version, pagos) = find_pagos(comprobante)?;
    let ns = version.namespace();

    let totals = match version {
        PaymentsVersion::V20 => extract_totals(pagos, ns),
        PaymentsVersion::V10 => PaymentTotals::default(),
    };

    let payments = find_children_ns(pagos, Some(ns), "Pago")
        .map(|pago| extract_payment(pago, version))
        .collect::<Vec<_>>();

    tracing::debug!(
        version = version.as_str(),
        payments = payments.len(),
        "extracted payment complement"
    );

    Some(PaymentComplement {
        version,
        totals,
        payments,
    })
}

/// Read Pagos 2.0 totals from the `Totales` child, falling back to the same
/// attributes on `Pagos` itself.
fn extract_totals(pagos: Node<'_, '_>, ns: &str) -> PaymentTotals {
    let source = find_child_ns(pagos, Some(ns), "Totales").unwrap_or(pagos);
    let amount = |name: &str| attr_f64(source, &[name], 0.0);

    PaymentTotals {
        withheld_vat: amount("TotalRetencionesIVA"),
        withheld_isr: amount("TotalRetencionesISR"),
        withheld_ieps: amount("TotalRetencionesIEPS"),
        transferred_base_vat16: amount("TotalTrasladosBaseIVA16"),
        transferred_vat16: amount("TotalTrasladosImpuestoIVA16"),
        transferred_base_vat8: amount("TotalTrasladosBaseIVA8"),
        transferred_vat8: amount("TotalTrasladosImpuestoIVA8"),
        transferred_base_vat0: amount("TotalTrasladosBaseIVA0"),
        transferred_vat0: amount("TotalTrasladosImpuestoIVA0"),
        transferred_base_vat_exempt: amount("TotalTrasladosBaseIVAExento"),
        total_paid: amount("MontoTotalPagos"),
    }
}

fn extract_payment(pago: Node<'_, '_>, version: PaymentsVersion) -> Payment {
    let ns = version.namespace();

    let taxes = match version {
        PaymentsVersion::V20 => find_child_ns(pago, Some(ns), "ImpuestosP")
            .map(|impuestos| extract_tax_entries(impuestos, ns, "P"))
            .unwrap_or_default(),
        PaymentsVersion::V10 => Vec::new(),
    };

    let related_documents = find_children_ns(pago, Some(ns), "DoctoRelacionado")
        .map(|docto| extract_related_document(docto, version))
        .collect();

    Payment {
        date: attr(pago, &["FechaPago"]),
        form: attr(pago, &["FormaDePagoP"]),
        currency: attr(pago, &["MonedaP"]),
        amount: attr_f64(pago, &["Monto"], 0.0),
        exchange_rate: attr_f64(pago, &["TipoCambioP"], 1.0),
        operation_number: attr(pago, &["NumOperacion"]),
        ordering_rfc: attr(pago, &["RfcEmisorCtaOrd"]),
        ordering_bank_name: attr(pago, &["NomBancoOrdExt"]),
        ordering_account: attr(pago, &["CtaOrdenante"]),
        beneficiary_rfc: attr(pago, &["RfcEmisorCtaBen"]),
        beneficiary_account: attr(pago, &["CtaBeneficiario"]),
        taxes,
        related_documents,
    }
}

fn extract_related_document(docto: Node<'_, '_>, version: PaymentsVersion) -> RelatedDocument {
    let ns = version.namespace();

    let (tax_object, equivalence, taxes) = match version {
        PaymentsVersion::V20 => (
            attr(docto, &["ObjetoImpDR"]),
            attr_f64(docto, &["EquivalenciaDR"], 1.0),
            find_child_ns(docto, Some(ns), "ImpuestosDR")
                .map(|impuestos| extract_tax_entries(impuestos, ns, "DR"))
                .unwrap_or_default(),
        ),
        PaymentsVersion::V10 => (String::new(), 1.0, Vec::new()),
    };

    RelatedDocument {
        id: attr(docto, &["IdDocumento"]),
        series: attr(docto, &["Serie"]),
        folio: attr(docto, &["Folio"]),
        currency: attr(docto, &["MonedaDR"]),
        installment: attr(docto, &["NumParcialidad"]),
        prior_balance: attr_f64(docto, &["ImpSaldoAnt"], 0.0),
        amount_paid: attr_f64(docto, &["ImpPagado"], 0.0),
        remaining_balance: attr_f64(docto, &["ImpSaldoInsoluto"], 0.0),
        tax_object,
        equivalence,
        taxes,
    }
}

/// Extract withheld then transferred entries from an `Impuestos{suffix}`
/// element, in document order within each group.
fn extract_tax_entries(impuestos: Node<'_, '_>, ns: &str, suffix: &str) -> Vec<TaxEntry> {
    let groups = [
        (TaxCategory::Withheld, "Retenciones", "Retencion"),
        (TaxCategory::Transferred, "Traslados", "Traslado"),
    ];

    let mut entries = Vec::new();
    for (category, container, item) in groups {
        let container = format!("{container}{suffix}");
        let item = format!("{item}{suffix}");
        let Some(group) = find_child_ns(impuestos, Some(ns), &container) else {
            continue;
        };
        for node in find_children_ns(group, Some(ns), &item) {
            entries.push(TaxEntry {
                category,
                tax_code: attr(node, &[format!("Impuesto{suffix}").as_str()]),
                base: attr_f64(node, &[format!("Base{suffix}").as_str()], 0.0),
                factor_type: attr(node, &[format!("TipoFactor{suffix}").as_str()]),
                rate: attr(node, &[format!("TasaOCuota{suffix}").as_str()]),
                amount: attr_f64(node, &[format!("Importe{suffix}").as_str()], 0.0),
            });
        }
    }
    entries
}
