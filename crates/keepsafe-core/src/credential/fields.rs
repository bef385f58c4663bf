//! Static field schema for credential records
//!
//! Front ends build their forms and tables from [`FIELDS`] instead of
//! hard-coding columns.

use super::CredentialRecord;

/// A column of the credentials table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Email,
    Password,
    Website,
}

/// What a front end may do with a field's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCapabilities {
    /// Value may be copied to the clipboard
    pub can_copy: bool,
    /// Value is a location that can be opened
    pub can_goto: bool,
    /// Value is masked by default
    pub private: bool,
}

/// Descriptor of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    /// Column name in the credentials table
    pub column: &'static str,
    /// Human-readable label
    pub label: &'static str,
    pub capabilities: FieldCapabilities,
}

/// All fields, in display order
pub const FIELDS: [FieldSpec; 4] = [
    FieldSpec {
        field: Field::Name,
        column: "name",
        label: "Name",
        capabilities: FieldCapabilities {
            can_copy: true,
            can_goto: false,
            private: false,
        },
    },
    FieldSpec {
        field: Field::Email,
        column: "email",
        label: "Email",
        capabilities: FieldCapabilities {
            can_copy: true,
            can_goto: false,
            private: false,
        },
    },
    FieldSpec {
        field: Field::Password,
        column: "password",
        label: "Password",
        capabilities: FieldCapabilities {
            can_copy: true,
            can_goto: false,
            private: true,
        },
    },
    FieldSpec {
        field: Field::Website,
        column: "website",
        label: "Website",
        capabilities: FieldCapabilities {
            can_copy: true,
            can_goto: true,
            private: false,
        },
    },
];

impl Field {
    pub const ALL: [Field; 4] = [Field::Name, Field::Email, Field::Password, Field::Website];

    pub fn spec(self) -> &'static FieldSpec {
        match self {
            Field::Name => &FIELDS[0],
            Field::Email => &FIELDS[1],
            Field::Password => &FIELDS[2],
            Field::Website => &FIELDS[3],
        }
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    pub fn capabilities(self) -> FieldCapabilities {
        self.spec().capabilities
    }

    /// Plain-text value of the field, `None` for the encrypted password
    pub fn text(self, record: &CredentialRecord) -> Option<&str> {
        match self {
            Field::Name => Some(&record.name),
            Field::Email => Some(&record.email),
            Field::Password => None,
            Field::Website => Some(&record.website),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lookup_matches_table() {
        for field in Field::ALL {
            assert_eq!(field.spec().field, field);
        }
    }

    #[test]
    fn test_capabilities() {
        assert!(Field::Password.capabilities().private);
        assert!(Field::Website.capabilities().can_goto);
        assert!(!Field::Email.capabilities().can_goto);
        assert!(FIELDS.iter().all(|spec| spec.capabilities.can_copy));
        assert_eq!(
            FIELDS.iter().filter(|spec| spec.capabilities.private).count(),
            1
        );
    }

    #[test]
    fn test_text_never_exposes_password() {
        let record = CredentialRecord::new("alice", "a@x.com", vec![1, 2, 3], "http://x.com");

        assert_eq!(Field::Name.text(&record), Some("alice"));
        assert_eq!(Field::Website.text(&record), Some("http://x.com"));
        assert_eq!(Field::Password.text(&record), None);
    }
}
