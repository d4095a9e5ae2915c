//! Static resource accounting for one machine
//!
//! A node advertises a fixed set of named resource quantities ("CPU", "GPU",
//! custom labels) supplied on the command line at startup. The set is parsed
//! once during bootstrap and never mutated afterwards; accounting against it
//! is the scheduler's concern, not ours.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::ConfigError;

/// Named resource quantities describing a machine's static compute capacity.
///
/// Keys are unique; insertion order is irrelevant. Quantities are
/// non-negative reals (fractional resources are allowed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSet {
    quantities: BTreeMap<String, f64>,
}

impl ResourceSet {
    /// Parse a flat `name1,qty1,name2,qty2,...` listing.
    ///
    /// Tokens are consumed two at a time. A name without a matching quantity
    /// or a quantity that does not parse as a number is a fatal
    /// configuration error. Duplicate names keep the last occurrence. The
    /// empty string is a valid listing with zero static resources.
    pub fn parse(listing: &str) -> Result<Self, ConfigError> {
        let mut quantities = BTreeMap::new();
        if listing.is_empty() {
            return Ok(Self { quantities });
        }

        let mut tokens = listing.split(',');
        while let Some(name) = tokens.next() {
            let value = tokens.next().ok_or_else(|| ConfigError::UnpairedResource {
                name: name.to_string(),
            })?;
            let quantity: f64 = value.parse().map_err(|_| ConfigError::InvalidQuantity {
                name: name.to_string(),
                value: value.to_string(),
            })?;
            quantities.insert(name.to_string(), quantity);
        }

        Ok(Self { quantities })
    }

    /// Quantity of a named resource, if the node advertises it.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.quantities.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    /// Iterate over `(name, quantity)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.quantities.iter().map(|(name, qty)| (name.as_str(), *qty))
    }

    /// Flat copy for wire messages.
    pub fn to_map(&self) -> HashMap<String, f64> {
        self.quantities
            .iter()
            .map(|(name, qty)| (name.clone(), *qty))
            .collect()
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, qty)) in self.quantities.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {qty}")?;
        }
        write!(f, "}}")
    }
}
