use std::collections::HashMap;
use std::sync::Arc;

use super::{clamp_index, Attribute, Filter, FilterValue, LoanRecord};
use crate::errors::{LoanBacktestError, Result};

/// Conversion tables and candidate masks for one categorical attribute.
///
/// Category `i` of the alphabet owns bit `1 << i`. Built once per attribute and
/// shared by every filter instance.
#[derive(Debug)]
pub struct CategoryTable {
    name: &'static str,
    attribute: Attribute,
    /// Canonical labels in bit order.
    labels: Vec<String>,
    conversion: HashMap<String, FilterValue>,
    options: Vec<FilterValue>,
    /// Render wide masks by the categories they leave out.
    render_excluded: bool,
}

impl CategoryTable {
    fn with_alphabet(name: &'static str, attribute: Attribute, labels: &[&str]) -> Self {
        assert!(labels.len() < 64, "category alphabet must fit in a FilterValue");
        let conversion = labels
            .iter()
            .enumerate()
            .map(|(bit, label)| (label.to_string(), (1 as FilterValue) << bit))
            .collect();
        Self {
            name,
            attribute,
            labels: labels.iter().map(|label| label.to_string()).collect(),
            conversion,
            options: Vec::new(),
            render_excluded: false,
        }
    }

    fn full_mask(&self) -> FilterValue {
        ((1 as FilterValue) << self.labels.len()) - 1
    }

    /// Table whose options are every non-empty combination of categories.
    pub fn power_set(name: &'static str, attribute: Attribute, labels: &[&str]) -> Self {
        let mut table = Self::with_alphabet(name, attribute, labels);
        table.options = (1..((1 as FilterValue) << labels.len())).collect();
        table
    }

    /// Table whose options are every single label, then every longer
    /// contiguous run of `alphabet`, shortest runs first. Run labels such as
    /// `"BCD"` convert to the OR of their letters.
    pub fn contiguous_runs(
        name: &'static str,
        attribute: Attribute,
        labels: &[&str],
        alphabet: &str,
    ) -> Result<Self> {
        let mut table = Self::with_alphabet(name, attribute, labels);
        table.options = (0..labels.len()).map(|bit| (1 as FilterValue) << bit).collect();
        let letters: Vec<char> = alphabet.chars().collect();
        if letters.is_empty() {
            return Err(LoanBacktestError::config_error(format!(
                "{} alphabet must not be empty",
                name
            )));
        }

        let bits = letters
            .iter()
            .map(|letter| table.lookup(&letter.to_string()))
            .collect::<Result<Vec<_>>>()?;

        for length in 1..=letters.len() {
            for start in 0..=(letters.len() - length) {
                let label: String = letters[start..start + length].iter().collect();
                let mask = bits[start..start + length].iter().fold(0 as FilterValue, |acc, &bit| acc | bit);
                table.conversion.entry(label).or_insert(mask);
                if !table.options.contains(&mask) {
                    table.options.push(mask);
                }
            }
        }
        Ok(table)
    }

    /// Table whose options are the whole alphabet followed by the alphabet
    /// minus one category, for every category.
    pub fn exclusions(name: &'static str, attribute: Attribute, labels: &[&str]) -> Self {
        let mut table = Self::with_alphabet(name, attribute, labels);
        let full = table.full_mask();
        table.options = std::iter::once(full)
            .chain((0..labels.len()).map(|bit| full & !((1 as FilterValue) << bit)))
            .collect();
        table.render_excluded = true;
        table
    }

    /// Extra spelling for an existing category.
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        if let Some(&bits) = self.conversion.get(canonical) {
            self.conversion.insert(alias.to_string(), bits);
        }
        self
    }

    pub fn options(&self) -> &[FilterValue] {
        &self.options
    }

    fn lookup(&self, raw: &str) -> Result<FilterValue> {
        self.conversion
            .get(raw.trim())
            .copied()
            .ok_or_else(|| LoanBacktestError::UnknownCategory {
                filter: self.name,
                token: raw.to_string(),
            })
    }

    /// Comma separated labels of every set bit, in bit order. Exclusion
    /// tables render `any` for the whole alphabet and `not X` for the rest.
    fn render(&self, mask: FilterValue) -> String {
        if self.render_excluded {
            let full = self.full_mask();
            if mask & full == full {
                return "any".to_string();
            }
            return format!("not {}", self.join_labels(full & !mask));
        }
        self.join_labels(mask)
    }

    fn join_labels(&self, mask: FilterValue) -> String {
        self.labels
            .iter()
            .enumerate()
            .filter(|(bit, _)| mask & ((1 as FilterValue) << bit) != 0)
            .map(|(_, label)| label.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Set-intersection filter over a categorical attribute.
#[derive(Debug, Clone)]
pub struct BitmaskFilter {
    table: Arc<CategoryTable>,
    current: usize,
}

impl BitmaskFilter {
    pub fn new(table: Arc<CategoryTable>) -> Self {
        Self { table, current: 0 }
    }

    pub fn attribute(&self) -> Attribute {
        self.table.attribute
    }
}

impl Filter for BitmaskFilter {
    fn name(&self) -> &'static str {
        self.table.name
    }

    #[inline]
    fn options(&self) -> &[FilterValue] {
        &self.table.options
    }

    #[inline]
    fn current(&self) -> usize {
        self.current
    }

    #[inline]
    fn set_current(&mut self, index: usize) {
        self.current = clamp_index(index, self.table.options.len());
    }

    fn convert(&self, raw: &str) -> Result<FilterValue> {
        self.table.lookup(raw)
    }

    fn stringify(&self, value: FilterValue) -> String {
        self.table.render(value)
    }

    #[inline]
    fn apply(&self, loan: &LoanRecord) -> bool {
        loan.get(self.table.attribute) & self.value() != 0
    }
}
