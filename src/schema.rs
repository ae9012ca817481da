//! Schema registry: the fixed, ordered column set every record conforms to.
//!
//! Every other stage (prompt builder, parser, persistence, merger) reads the
//! column order from here instead of keeping its own list. A column added or
//! renamed in [`REMITTANCE_FIELDS`] therefore flows through the whole
//! pipeline, and the per-document files and the consolidated dataset can
//! never disagree about ordering.
//!
//! Each field carries two names:
//!
//! * `key`: the snake_case identifier the oracle uses in JSON mode
//!   (`"iban"`, `"importe"`, …)
//! * `header`: the column label written to the TSV header line
//!   (`"IBAN"`, `"Importe"`, …)

use serde::Serialize;

/// Value family a column accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    /// Free text, carried through verbatim.
    Text,
    /// Decimal amount with `.` as the decimal point.
    Amount,
    /// Calendar date in `DD/MM/YYYY` form.
    Date,
}

/// One column of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub key: &'static str,
    pub header: &'static str,
    pub kind: FieldKind,
    /// Short description used when building the prompt.
    pub description: &'static str,
}

/// Remittance document fields, in output order.
pub const REMITTANCE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: "referencia_unica",
        header: "Referencia Única",
        kind: FieldKind::Text,
        description: "Unique reference of the payment order",
    },
    FieldSpec {
        key: "nombre_librado",
        header: "Nombre del Librado",
        kind: FieldKind::Text,
        description: "Full name of the payer (librado)",
    },
    FieldSpec {
        key: "iban",
        header: "IBAN",
        kind: FieldKind::Text,
        description: "IBAN account number, keep the original spacing",
    },
    FieldSpec {
        key: "importe",
        header: "Importe",
        kind: FieldKind::Amount,
        description: "Amount in euros, number only",
    },
    FieldSpec {
        key: "vencimiento",
        header: "Vencimiento",
        kind: FieldKind::Date,
        description: "Due date",
    },
    FieldSpec {
        key: "emisor",
        header: "Emisor",
        kind: FieldKind::Text,
        description: "Name of the issuer",
    },
    FieldSpec {
        key: "identificacion_emisor",
        header: "Identificación del Emisor",
        kind: FieldKind::Text,
        description: "Issuer identification number or code",
    },
    FieldSpec {
        key: "referencia_fichero",
        header: "Referencia del Fichero",
        kind: FieldKind::Text,
        description: "Batch file reference",
    },
    FieldSpec {
        key: "fecha_recepcion",
        header: "Fecha de Recepción",
        kind: FieldKind::Date,
        description: "Receipt date",
    },
    FieldSpec {
        key: "fecha_documento",
        header: "Fecha del Documento",
        kind: FieldKind::Date,
        description: "Document date",
    },
    FieldSpec {
        key: "referencia_documento",
        header: "Referencia Única del Documento",
        kind: FieldKind::Text,
        description: "Unique reference of the document",
    },
];

/// Provenance column appended to every persisted record.
pub const PROVENANCE_FIELD: FieldSpec = FieldSpec {
    key: "archivo_origen",
    header: "Archivo_Origen",
    kind: FieldKind::Text,
    description: "Source document file name",
};

/// Immutable ordered field list plus the provenance column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [FieldSpec],
    provenance: FieldSpec,
}

static REMITTANCE: Schema = Schema {
    fields: REMITTANCE_FIELDS,
    provenance: PROVENANCE_FIELD,
};

impl Schema {
    /// The process-wide remittance schema.
    pub fn remittance() -> &'static Schema {
        &REMITTANCE
    }

    /// Data fields in order (without provenance).
    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn provenance(&self) -> &FieldSpec {
        &self.provenance
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a data field by its key.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.key == key)
    }

    /// Column labels of the persisted layout: data fields then provenance.
    pub fn columns(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .map(|f| f.header)
            .chain(std::iter::once(self.provenance.header))
            .collect()
    }

    /// The canonical header line (tab-joined, no trailing newline).
    pub fn header_line(&self) -> String {
        self.columns().join("\t")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn remittance_has_eleven_fields() {
        assert_eq!(Schema::remittance().len(), 11);
    }

    #[test]
    fn keys_and_headers_are_unique() {
        let schema = Schema::remittance();
        let keys: HashSet<_> = schema.fields().iter().map(|f| f.key).collect();
        let headers: HashSet<_> = schema.columns().into_iter().collect();
        assert_eq!(keys.len(), schema.len());
        assert_eq!(headers.len(), schema.len() + 1);
        assert!(!keys.contains(PROVENANCE_FIELD.key));
    }

    #[test]
    fn header_line_ends_with_provenance() {
        let line = Schema::remittance().header_line();
        assert!(line.starts_with("Referencia Única\tNombre del Librado\tIBAN"));
        assert!(line.ends_with("\tArchivo_Origen"));
        assert_eq!(line.split('\t').count(), 12);
    }

    #[test]
    fn index_of_known_and_unknown() {
        let schema = Schema::remittance();
        assert_eq!(schema.index_of("iban"), Some(2));
        assert_eq!(schema.index_of("importe"), Some(3));
        assert_eq!(schema.index_of("nope"), None);
    }
}
