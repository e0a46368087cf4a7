//! Fiscal regime catalog (c_RegimenFiscal).

/// Translate a fiscal regime code into its catalog description.
///
/// Unknown codes render as `unidentified regime: <code>` so the raw value
/// survives into reports.
///
/// # Examples
/// ```
/// use sat_cfdi::regime::regime_label;
///
/// assert_eq!(regime_label("626"), "Régimen Simplificado de Confianza");
/// assert_eq!(regime_label("999"), "unidentified regime: 999");
/// ```
#[must_use]
pub fn regime_label(code: &str) -> String {
    let label = match code.trim() {
        "601" => "General de Ley Personas Morales",
        "603" => "Personas Morales con Fines no Lucrativos",
        "605" => "Sueldos y Salarios e Ingresos Asimilados a Salarios",
        "606" => "Arrendamiento",
        "608" => "Demás ingresos",
        "609" => "Consolidación",
        "610" => "Residentes en el Extranjero sin Establecimiento Permanente en México",
        "611" => "Ingresos por Dividendos (socios y accionistas)",
        "612" => "Personas Físicas con Actividades Empresariales y Profesionales",
        "614" => "Ingresos por intereses",
        "616" => "Sin obligaciones fiscales",
        "620" => "Sociedades Cooperativas de Producción que optan por diferir sus ingresos",
        "621" => "Incorporación Fiscal",
        "622" => "Actividades Agrícolas, Ganaderas, Silvícolas y Pesqueras",
        "623" => "Opcional para Grupos de Sociedades",
        "624" => "Coordinados",
        "625" => "Régimen de las Actividades Empresariales con ingresos a través de Plataformas Tecnológicas",
        "626" => "Régimen Simplificado de Confianza",
        other => return format!("unidentified regime: {other}"),
    };
    label.to_string()
}
