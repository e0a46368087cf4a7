//! XML utility functions for navigating CFDI trees.
//!
//! CFDI documents mix several namespaces (the comprobante itself, the
//! payment complement, the fiscal stamp, local taxes). Lookups here are
//! namespace-aware: an element matches only when both its local name and its
//! namespace URI match.

use roxmltree::Node;

/// CFDI 3.3 comprobante namespace.
pub const CFDI_33_NS: &str = "http://www.sat.gob.mx/cfd/3";

/// CFDI 4.0 comprobante namespace.
pub const CFDI_40_NS: &str = "http://www.sat.gob.mx/cfd/4";

/// Payment complement 1.0 namespace.
pub const PAGOS_10_NS: &str = "http://www.sat.gob.mx/Pagos";

/// Payment complement 2.0 namespace.
pub const PAGOS_20_NS: &str = "http://www.sat.gob.mx/Pagos20";

/// Fiscal stamp (TimbreFiscalDigital) namespace.
pub const TFD_NS: &str = "http://www.sat.gob.mx/TimbreFiscalDigital";

/// Local (state-level) taxes namespace.
pub const IMPLOCAL_NS: &str = "http://www.sat.gob.mx/implocal";

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use sat_cfdi::xml::get_tag_name;
///
/// let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4"/>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "Comprobante");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Check whether `node` is an element named `tag` in namespace `ns`.
///
/// `ns == None` matches only elements without a namespace.
pub fn is_element_ns(node: Node<'_, '_>, ns: Option<&str>, tag: &str) -> bool {
    node.is_element() && get_tag_name(node) == tag && node.tag_name().namespace() == ns
}

/// Find the first child element with the given namespace and tag name.
pub fn find_child_ns<'a, 'input>(
    node: Node<'a, 'input>,
    ns: Option<&str>,
    tag: &str,
) -> Option<Node<'a, 'input>> {
    node.children().find(|child| is_element_ns(*child, ns, tag))
}

/// Find all child elements with the given namespace and tag name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use sat_cfdi::xml::find_children_ns;
///
/// let xml = r#"<p:Pagos xmlns:p="urn:p"><p:Pago/><p:Pago/><Pago/></p:Pagos>"#;
/// let doc = Document::parse(xml).unwrap();
/// let pagos: Vec<_> = find_children_ns(doc.root_element(), Some("urn:p"), "Pago").collect();
/// assert_eq!(pagos.len(), 2);
/// ```
pub fn find_children_ns<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: Option<&'a str>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| is_element_ns(*child, ns, tag))
}

/// Find all descendant elements (excluding `node` itself) with the given
/// namespace and tag name, in document order.
pub fn descendants_ns<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: Option<&'a str>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .skip(1)
        .filter(move |n| is_element_ns(*n, ns, tag))
}

/// Find the first descendant element with the given namespace and tag name.
pub fn find_descendant_ns<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    ns: Option<&'a str>,
    tag: &'a str,
) -> Option<Node<'a, 'input>> {
    descendants_ns(node, ns, tag).next()
}

/// Find the first descendant element with the given local name, in any
/// namespace.
pub fn find_descendant_by_name<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
) -> Option<Node<'a, 'input>> {
    node.descendants()
        .find(|n| n.is_element() && get_tag_name(*n) == tag)
}

/// Get the first non-empty attribute among `names`, trimmed.
///
/// CFDI generations disagree on attribute casing (`Version` vs `version`),
/// so callers pass every accepted spelling.
///
/// # Returns
/// The attribute value, or an empty string when none is present
pub fn attr(node: Node<'_, '_>, names: &[&str]) -> String {
    names
        .iter()
        .filter_map(|name| node.attribute(*name))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Like [`attr`], but on an optional node.
pub fn attr_opt(node: Option<Node<'_, '_>>, names: &[&str]) -> String {
    node.map(|n| attr(n, names)).unwrap_or_default()
}

/// Get a numeric attribute.
///
/// Missing or empty attributes yield `default`. Unparseable values yield
/// `default` as well and are logged at debug level.
pub fn attr_f64(node: Node<'_, '_>, names: &[&str], default: f64) -> f64 {
    let raw = attr(node, names);
    if raw.is_empty() {
        return default;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            tracing::debug!(
                element = get_tag_name(node),
                value = %raw,
                "unparseable numeric attribute, using default"
            );
            default
        }
    }
}

/// Get the text content of a node, trimmed.
pub fn get_text(node: Node<'_, '_>) -> String {
    node.text()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
