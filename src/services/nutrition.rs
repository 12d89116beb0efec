//! Turns detected food items into the nutrition panel.
//!
//! Values come from the prediction service as strings such as `"12.5g"` or
//! `"98kcal"`. Each one is split into a magnitude and a unit suffix, scaled by
//! the item count and summed per nutrient.

use crate::models::{DetectedItem, NutrientLine, NutrientTotal, NutritionPanel, RenderedItem};

/// A value string split into magnitude and unit suffix
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: String,
}

/// Parse "number + optional unit", e.g. `"12.5g"`, `"5 g"`, `"62kcal"`, `"40"`.
///
/// The value must start with a run of digits and dots. The magnitude is the
/// longest decimal prefix of that run (`"1.2.3"` reads as 1.2); whatever follows
/// the run and any whitespace is the unit. Line breaks in the unit reject the value.
pub fn parse_quantity(value: &str) -> Option<Quantity> {
    let run_len = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    if run_len == 0 {
        return None;
    }

    let (run, rest) = value.split_at(run_len);
    let unit = rest.trim_start();
    if unit.contains(['\n', '\r', '\u{2028}', '\u{2029}']) {
        return None;
    }

    Some(Quantity {
        magnitude: leading_decimal(run)?,
        unit: unit.to_string(),
    })
}

/// Longest prefix of a digits-and-dots run that forms a decimal number
fn leading_decimal(run: &str) -> Option<f64> {
    let first_dot = run.find('.');
    let end = match first_dot {
        Some(dot) => run[dot + 1..].find('.').map_or(run.len(), |next| dot + 1 + next),
        None => run.len(),
    };

    let candidate = &run[..end];
    if !candidate.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    candidate.parse::<f64>().ok()
}

/// Round half up to three decimals
pub fn round3(value: f64) -> f64 {
    let rounded = (value * 1000.0 + 0.5).floor() / 1000.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Rounding used for totals; nudges by epsilon so sums like 1.0005 land upward
pub fn round3_total(value: f64) -> f64 {
    round3(value + f64::EPSILON)
}

/// Shortest decimal form: `10`, `12.5`, `0.021`
pub fn format_amount(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Running per-nutrient sums, kept in first-seen order
#[derive(Debug, Default)]
struct Totals {
    entries: Vec<NutrientTotal>,
}

impl Totals {
    fn add(&mut self, nutrient: &str, amount: f64, unit: &str) {
        match self.entries.iter_mut().find(|t| t.nutrient == nutrient) {
            Some(total) => {
                if total.unit != unit {
                    log::warn!(
                        "⚠️ Inconsistent units for {}: '{}' then '{}', keeping '{}'",
                        nutrient,
                        total.unit,
                        unit,
                        unit
                    );
                    total.unit = unit.to_string();
                }
                total.value += amount;
            }
            None => self.entries.push(NutrientTotal {
                nutrient: nutrient.to_string(),
                value: amount,
                unit: unit.to_string(),
            }),
        }
    }

    fn into_rounded(self) -> Vec<NutrientTotal> {
        self.entries
            .into_iter()
            .map(|t| NutrientTotal {
                value: round3_total(t.value),
                ..t
            })
            .collect()
    }
}

/// Build the nutrition panel for a list of detected items, in response order.
///
/// Items without a name, a count or any nutrition values are skipped whole.
/// Values that do not parse are dropped. An item left with no lines is not shown,
/// and if nothing is shown the panel says no food was detected.
pub fn build_panel(items: &[DetectedItem]) -> NutritionPanel {
    let mut rendered = Vec::new();
    let mut totals = Totals::default();

    for item in items {
        let (Some(name), Some(count), Some(nutrition)) =
            (item.name.as_deref(), item.count, item.nutrition.as_ref())
        else {
            log::debug!("Skipping incomplete item: {:?}", item);
            continue;
        };
        if name.is_empty() || nutrition.is_empty() {
            log::debug!("Skipping item without name or nutrition: {:?}", item);
            continue;
        }

        let mut lines = Vec::new();
        for (nutrient, value) in nutrition {
            let Some(quantity) = value_text(value).as_deref().and_then(parse_quantity) else {
                log::debug!("Dropping unparseable value for {} / {}: {}", name, nutrient, value);
                continue;
            };

            let amount = round3(quantity.magnitude * count);
            if !amount.is_finite() {
                continue;
            }

            totals.add(nutrient, amount, &quantity.unit);
            lines.push(NutrientLine {
                nutrient: nutrient.clone(),
                amount,
                unit: quantity.unit,
            });
        }

        if lines.is_empty() {
            continue;
        }

        rendered.push(RenderedItem {
            name: name.to_string(),
            count,
            lines,
        });
    }

    if rendered.is_empty() {
        return NutritionPanel::NoFoodDetected;
    }

    NutritionPanel::Items {
        items: rendered,
        totals: totals.into_rounded(),
    }
}
