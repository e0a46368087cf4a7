//! Tax totals of a comprobante.

use roxmltree::Node;

use crate::types::{SchemaVersion, TaxTotals, TAX_IEPS, TAX_ISR, TAX_IVA};
use crate::xml::{attr, attr_f64, descendants_ns, find_child_ns, find_children_ns, IMPLOCAL_NS};

/// Running sums for one `Impuestos` block.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct TaxSums {
    vat: f64,
    excise: f64,
    withheld_isr: f64,
    withheld_vat: f64,
}

impl TaxSums {
    /// Fold the `Traslados/Traslado` and `Retenciones/Retencion` entries of
    /// an `Impuestos` element into the sums with `combine(current, amount)`.
    fn fold_block(&mut self, impuestos: Node<'_, '_>, ns: &str, combine: fn(f64, f64) -> f64) {
        let ns = Some(ns);
        if let Some(traslados) = find_child_ns(impuestos, ns, "Traslados") {
            for traslado in find_children_ns(traslados, ns, "Traslado") {
                let amount = attr_f64(traslado, &["Importe", "importe"], 0.0);
                match attr(traslado, &["Impuesto", "impuesto"]).as_str() {
                    TAX_IVA => self.vat = combine(self.vat, amount),
                    TAX_IEPS => self.excise = combine(self.excise, amount),
                    _ => {}
                }
            }
        }
        if let Some(retenciones) = find_child_ns(impuestos, ns, "Retenciones") {
            for retencion in find_children_ns(retenciones, ns, "Retencion") {
                let amount = attr_f64(retencion, &["Importe", "importe"], 0.0);
                match attr(retencion, &["Impuesto", "impuesto"]).as_str() {
                    TAX_ISR => self.withheld_isr = combine(self.withheld_isr, amount),
                    TAX_IVA => self.withheld_vat = combine(self.withheld_vat, amount),
                    _ => {}
                }
            }
        }
    }
}

fn add(current: f64, amount: f64) -> f64 {
    current + amount
}

/// Sum the taxes of every `Concepto/Impuestos` block.
fn concept_sums(comprobante: Node<'_, '_>, ns: &str) -> TaxSums {
    let mut sums = TaxSums::default();
    if let Some(conceptos) = find_child_ns(comprobante, Some(ns), "Conceptos") {
        for concepto in find_children_ns(conceptos, Some(ns), "Concepto") {
            if let Some(impuestos) = find_child_ns(concepto, Some(ns), "Impuestos") {
                sums.fold_block(impuestos, ns, add);
            }
        }
    }
    sums
}

/// First non-zero amount per code and category in the comprobante-level
/// `Impuestos` block (a direct child of the root).
fn document_amounts(comprobante: Node<'_, '_>, ns: &str) -> TaxSums {
    let mut amounts = TaxSums::default();
    if let Some(impuestos) = find_child_ns(comprobante, Some(ns), "Impuestos") {
        amounts.fold_block(impuestos, ns, or_fallback);
    }
    amounts
}

fn or_fallback(primary: f64, fallback: f64) -> f64 {
    if primary == 0.0 {
        fallback
    } else {
        primary
    }
}

/// Sum local transferred taxes (`implocal:ImpuestosLocales/TrasladosLocales`).
#[must_use]
pub fn local_taxes(comprobante: Node<'_, '_>) -> f64 {
    descendants_ns(comprobante, Some(IMPLOCAL_NS), "TrasladosLocales")
        .map(|node| attr_f64(node, &["Importe"], 0.0))
        .sum()
}

/// Extract the aggregated taxes of a comprobante.
///
/// Amounts are summed across concepts by tax code and category. For CFDI 3.3
/// each amount whose per-concept sum is zero falls back to the first non-zero
/// matching entry of the comprobante-level block. The fallback is an
/// approximation and never applies to 4.0.
#[must_use]
pub fn extract_tax_totals(comprobante: Node<'_, '_>, version: SchemaVersion) -> TaxTotals {
    let ns = version.namespace();
    let mut sums = concept_sums(comprobante, ns);

    if version == SchemaVersion::V33 {
        let document = document_amounts(comprobante, ns);
        sums = TaxSums {
            vat: or_fallback(sums.vat, document.vat),
            excise: or_fallback(sums.excise, document.excise),
            withheld_isr: or_fallback(sums.withheld_isr, document.withheld_isr),
            withheld_vat: or_fallback(sums.withheld_vat, document.withheld_vat),
        };
    }

    TaxTotals {
        vat: sums.vat,
        excise: sums.excise,
        local: local_taxes(comprobante),
        withheld_isr: sums.withheld_isr,
        withheld_vat: sums.withheld_vat,
    }
}
