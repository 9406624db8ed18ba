//! Method descriptor parsing.
//!
//! A [`Signature`] is parsed from a JVM method descriptor such as `(IJ[Ljava/lang/String;)V`
//! and answers the questions the graph builder asks when it pops arguments and pushes
//! results: how many stack slots the arguments occupy and what kind the result has.

use std::{iter::Peekable, str::Bytes};

use crate::{meta::Kind, Result};

/// One parameter or return type of a descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureType {
    /// The value kind
    pub kind: Kind,
    /// Descriptor text for reference types (`Ljava/lang/Object;`, `[I`), `None` for primitives
    pub descriptor: Option<String>,
}

impl SignatureType {
    /// Returns the class name of a non-array reference type (`java/lang/Object`).
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        self.descriptor
            .as_deref()
            .and_then(|d| d.strip_prefix('L'))
            .and_then(|d| d.strip_suffix(';'))
    }
}

/// A parsed method descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    descriptor: String,
    arguments: Vec<SignatureType>,
    ret: SignatureType,
}

impl Signature {
    /// Parses a method descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is not a well-formed method
    /// descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut bytes = descriptor.bytes().peekable();
        if bytes.next() != Some(b'(') {
            return Err(malformed_error!(
                "Method descriptor '{}' does not start with '('",
                descriptor
            ));
        }

        let mut arguments = Vec::new();
        loop {
            match bytes.peek() {
                Some(b')') => {
                    bytes.next();
                    break;
                }
                Some(_) => {
                    let arg = Self::parse_type(&mut bytes, descriptor)?;
                    if arg.kind == Kind::Void {
                        return Err(malformed_error!(
                            "Void parameter in descriptor '{}'",
                            descriptor
                        ));
                    }
                    arguments.push(arg);
                }
                None => {
                    return Err(malformed_error!(
                        "Unterminated parameter list in '{}'",
                        descriptor
                    ))
                }
            }
        }

        let ret = Self::parse_type(&mut bytes, descriptor)?;
        if let Some(c) = bytes.next() {
            return Err(malformed_error!(
                "Unexpected leftover input '{}' in '{}'",
                c as char,
                descriptor
            ));
        }

        Ok(Signature {
            descriptor: descriptor.to_string(),
            arguments,
            ret,
        })
    }

    fn parse_type(bytes: &mut Peekable<Bytes<'_>>, descriptor: &str) -> Result<SignatureType> {
        let Some(c) = bytes.next() else {
            return Err(malformed_error!("Missing type in '{}'", descriptor));
        };

        match c {
            b'L' => {
                let mut text = String::from("L");
                for b in bytes.by_ref() {
                    text.push(b as char);
                    if b == b';' {
                        return Ok(SignatureType {
                            kind: Kind::Object,
                            descriptor: Some(text),
                        });
                    }
                }
                Err(malformed_error!("Unterminated class type in '{}'", descriptor))
            }
            b'[' => {
                let component = Self::parse_type(bytes, descriptor)?;
                if component.kind == Kind::Void {
                    return Err(malformed_error!("Array of void in '{}'", descriptor));
                }
                let inner = match component.descriptor {
                    Some(d) => d,
                    None => Self::primitive_char(component.kind).to_string(),
                };
                Ok(SignatureType {
                    kind: Kind::Object,
                    descriptor: Some(format!("[{inner}")),
                })
            }
            other => match Kind::from_type_char(other) {
                Some(kind) => Ok(SignatureType {
                    kind,
                    descriptor: None,
                }),
                None => Err(malformed_error!(
                    "Invalid type character '{}' in '{}'",
                    other as char,
                    descriptor
                )),
            },
        }
    }

    fn primitive_char(kind: Kind) -> char {
        match kind {
            Kind::Boolean => 'Z',
            Kind::Byte => 'B',
            Kind::Short => 'S',
            Kind::Char => 'C',
            Kind::Int => 'I',
            Kind::Float => 'F',
            Kind::Long => 'J',
            Kind::Double => 'D',
            _ => 'V',
        }
    }

    /// The original descriptor text.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// The declared parameters, receiver excluded.
    #[must_use]
    pub fn arguments(&self) -> &[SignatureType] {
        &self.arguments
    }

    /// Number of declared parameters, receiver excluded.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// Number of stack slots the arguments occupy, optionally including the receiver.
    #[must_use]
    pub fn argument_slots(&self, with_receiver: bool) -> usize {
        self.arguments.iter().map(|a| a.kind.slots()).sum::<usize>() + usize::from(with_receiver)
    }

    /// The return type.
    #[must_use]
    pub fn return_type(&self) -> &SignatureType {
        &self.ret
    }

    /// The return kind.
    #[must_use]
    pub fn return_kind(&self) -> Kind {
        self.ret.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_descriptor() {
        let sig = Signature::parse("(IJ[Ljava/lang/String;D)V").unwrap();
        let kinds: Vec<Kind> = sig.arguments().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![Kind::Int, Kind::Long, Kind::Object, Kind::Double]);
        assert_eq!(sig.argument_slots(false), 6);
        assert_eq!(sig.argument_slots(true), 7);
        assert_eq!(sig.return_kind(), Kind::Void);
        assert_eq!(
            sig.arguments()[2].descriptor.as_deref(),
            Some("[Ljava/lang/String;")
        );
    }

    #[test]
    fn test_class_name() {
        let sig = Signature::parse("(Ljava/lang/Object;[I)Ljava/lang/String;").unwrap();
        assert_eq!(sig.arguments()[0].class_name(), Some("java/lang/Object"));
        assert_eq!(sig.arguments()[1].class_name(), None);
        assert_eq!(sig.arguments()[1].descriptor.as_deref(), Some("[I"));
        assert_eq!(sig.return_type().class_name(), Some("java/lang/String"));
    }

    #[test]
    fn test_reject_malformed() {
        assert!(Signature::parse("I)V").is_err());
        assert!(Signature::parse("(I").is_err());
        assert!(Signature::parse("(Ljava/lang/Object)V").is_err());
        assert!(Signature::parse("(V)V").is_err());
        assert!(Signature::parse("()VV").is_err());
        assert!(Signature::parse("(Q)V").is_err());
    }
}
