use crate::jvm::{ConfigError, Error};
use std::str::FromStr;

/// Named set of class to element mappings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingDefinition {
    /// Goes into the names of generated methods, so it must be a valid identifier fragment
    pub name: String,
    pub mappings: Vec<Mapping>,
}

/// How one class maps to an element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// Class name, either as `com.example.Order` or `com/example/Order`
    pub class: String,
    pub element: String,
    pub members: Vec<MemberBinding>,
}

/// How one field maps to a child element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberBinding {
    pub field: String,
    pub element: String,
    pub style: ValueStyle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueStyle {
    /// Primitive or string, written as element text
    Text,

    /// Object with a mapping of its own
    Structure,

    /// Collection of objects with mappings of their own, each in an `item_element`
    Collection { item_element: String },
}

fn malformed(text: &str, message: impl Into<String>) -> Error {
    ConfigError::UnsupportedBinding {
        binding: text.to_owned(),
        message: message.into(),
    }
    .into()
}

/// Parses the compact command line form `CLASS=ELEMENT:FIELD[@ELEMENT][/STYLE],...`
///
/// The element of a field defaults to the field name. Styles are `text` (the default),
/// `structure`, and `collection` (with the item element given as `collection=ITEM`).
impl FromStr for Mapping {
    type Err = Error;

    fn from_str(text: &str) -> Result<Mapping, Error> {
        let (class, rest) = text
            .split_once('=')
            .ok_or_else(|| malformed(text, "expected `CLASS=ELEMENT:FIELDS`"))?;
        let (element, fields) = rest.split_once(':').unwrap_or((rest, ""));
        if class.is_empty() || element.is_empty() {
            return Err(malformed(text, "class and element must not be empty"));
        }

        let mut members = vec![];
        for field in fields.split(',').filter(|field| !field.is_empty()) {
            let (field, style) = match field.split_once('/') {
                None => (field, ValueStyle::Text),
                Some((field, style)) => (field, parse_style(text, style)?),
            };
            let (field, element) = field.split_once('@').unwrap_or((field, field));
            if field.is_empty() || element.is_empty() {
                return Err(malformed(text, "field and element must not be empty"));
            }
            members.push(MemberBinding {
                field: field.to_owned(),
                element: element.to_owned(),
                style,
            });
        }

        Ok(Mapping {
            class: class.to_owned(),
            element: element.to_owned(),
            members,
        })
    }
}

fn parse_style(text: &str, style: &str) -> Result<ValueStyle, Error> {
    match style.split_once('=') {
        None if style == "text" => Ok(ValueStyle::Text),
        None if style == "structure" => Ok(ValueStyle::Structure),
        Some(("collection", item)) if !item.is_empty() => Ok(ValueStyle::Collection {
            item_element: item.to_owned(),
        }),
        _ => Err(malformed(text, format!("unknown style `{}`", style))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_compact_mapping() {
        let mapping: Mapping = "com.example.Order=order:id,customer@cust/structure,items/collection=item"
            .parse()
            .unwrap();
        assert_eq!(mapping.class, "com.example.Order");
        assert_eq!(mapping.element, "order");
        assert_eq!(
            mapping.members,
            vec![
                MemberBinding {
                    field: String::from("id"),
                    element: String::from("id"),
                    style: ValueStyle::Text,
                },
                MemberBinding {
                    field: String::from("customer"),
                    element: String::from("cust"),
                    style: ValueStyle::Structure,
                },
                MemberBinding {
                    field: String::from("items"),
                    element: String::from("items"),
                    style: ValueStyle::Collection {
                        item_element: String::from("item")
                    },
                },
            ]
        );
    }

    #[test]
    fn mapping_without_fields() {
        let mapping: Mapping = "a/B=b".parse().unwrap();
        assert!(mapping.members.is_empty());
        assert_eq!(mapping.element, "b");
    }

    #[test]
    fn reject_bad_mappings() {
        assert!("no-equals".parse::<Mapping>().is_err());
        assert!("a.B=b:x/fancy".parse::<Mapping>().is_err());
        assert!("a.B=b:x/collection".parse::<Mapping>().is_err());
        assert!("=b:x".parse::<Mapping>().is_err());
    }
}
