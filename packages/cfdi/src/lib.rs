//! CFDI parser and classifier.
//!
//! Turns raw CFDI XML (3.3 and 4.0, with Pagos 1.0 and 2.0 payment
//! complements) into a [`TaxDocumentRecord`], classified relative to the
//! taxpayer that requested the documents.
//!
//! ```
//! use sat_cfdi::{parse_xml, DocumentRole};
//!
//! let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
//!     Version="4.0" TipoDeComprobante="I">
//!   <cfdi:Emisor Rfc="AAA010101AAA"/>
//!   <cfdi:Receptor Rfc="GOGR810728TV5"/>
//! </cfdi:Comprobante>"#;
//!
//! let record = parse_xml(xml.as_bytes(), "GOGR810728TV5").unwrap().unwrap();
//! assert_eq!(record.role, DocumentRole::Expense);
//! ```

pub mod classify;
pub mod error;
pub mod flatten;
pub mod parser;
pub mod payments;
pub mod regime;
pub mod taxes;
pub mod types;
pub mod xml;

pub use error::{CfdiError, Result};
pub use flatten::{flatten, FlatRecord, FlatValue};
pub use parser::{detect_version, parse_document, parse_xml};
pub use types::{
    DocumentRole, Party, Payment, PaymentComplement, PaymentTotals, PaymentsVersion,
    RelatedDocument, SchemaVersion, TaxCategory, TaxDocumentRecord, TaxEntry, TaxTotals,
};
