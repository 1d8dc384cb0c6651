//! Reproducible sample-data generation for inferred tables.
//!
//! Seeding uses a fixed-seed `StdRng` (seed 42) scoped to one run, so the
//! generated contents are identical across runs and tests can assert on
//! them. Row counts and values are driven by column names and table-name
//! context: product/order/user-flavoured tables draw from small curated
//! vocabularies, everything else gets bounded numbers or `Sample <col> <i>`
//! text.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::types::Value;
use rusqlite::Connection;

use super::schema::{infer_column_type, InferredSchema, InferredTable};

/// Fixed seed for the per-run random source.
pub const SEED: u64 = 42;

const PRODUCT_NAMES: &[&str] = &[
    "Widget", "Gadget", "Sprocket", "Flange", "Gizmo", "Bracket", "Coupler", "Spindle",
];
const ORDER_STATUSES: &[&str] = &["pending", "processing", "shipped", "delivered", "cancelled"];
const PERSON_NAMES: &[&str] = &[
    "Alice", "Bob", "Carol", "David", "Erin", "Frank", "Grace", "Henry",
];

/// Outcome of seeding one run's tables.
#[derive(Debug, Clone)]
pub struct SeedReport {
    pub rows_per_table: Vec<(String, i64)>,
    pub total_rows: i64,
}

#[derive(Clone, Copy, PartialEq)]
enum TableFlavor {
    Products,
    Orders,
    People,
    Generic,
}

fn flavor_of(table: &str) -> TableFlavor {
    let name = table.to_lowercase();
    if name.contains("product") || name.contains("item") {
        TableFlavor::Products
    } else if name.contains("order") {
        TableFlavor::Orders
    } else if name.contains("user") || name.contains("customer") || name.contains("person") {
        TableFlavor::People
    } else {
        TableFlavor::Generic
    }
}

/// Number of rows to generate for a table: grows with width, capped at 12.
pub fn row_count_for(table: &InferredTable) -> usize {
    (5 + table.columns.len()).min(12)
}

/// Populate every inferred table with generated rows.
pub fn seed_tables(
    conn: &Connection,
    schema: &InferredSchema,
) -> rusqlite::Result<SeedReport> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut report = SeedReport {
        rows_per_table: Vec::new(),
        total_rows: 0,
    };

    for table in &schema.tables {
        let rows = row_count_for(table);
        if table.columns.is_empty() {
            // Width-less stub: rows of default NULLs so COUNT(*) still works
            for _ in 0..rows {
                conn.execute(
                    &format!("INSERT INTO {} DEFAULT VALUES", table.name),
                    [],
                )?;
            }
        } else {
            let placeholders: Vec<String> =
                (1..=table.columns.len()).map(|i| format!("?{}", i)).collect();
            let insert_sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.name,
                table.columns.join(", "),
                placeholders.join(", ")
            );
            let mut statement = conn.prepare(&insert_sql)?;
            for i in 1..=rows {
                let values: Vec<Value> = table
                    .columns
                    .iter()
                    .map(|column| generate_value(&mut rng, flavor_of(&table.name), column, i))
                    .collect();
                statement.execute(rusqlite::params_from_iter(values))?;
            }
        }
        report
            .rows_per_table
            .push((table.name.clone(), rows as i64));
        report.total_rows += rows as i64;
    }

    Ok(report)
}

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options[rng.gen_range(0..options.len())]
}

/// One generated cell value. Name-driven vocabularies first, then the same
/// substring rules the type inference uses.
fn generate_value(rng: &mut StdRng, flavor: TableFlavor, column: &str, row: usize) -> Value {
    let name = column.to_lowercase();

    if name.contains("email") {
        let person = pick(rng, PERSON_NAMES).to_lowercase();
        return Value::Text(format!("{}{}@example.com", person, row));
    }
    if name.contains("status") {
        return Value::Text(pick(rng, ORDER_STATUSES).to_string());
    }
    if name.contains("name") {
        return match flavor {
            TableFlavor::Products => {
                Value::Text(format!("{} {}", pick(rng, PRODUCT_NAMES), rng.gen_range(100..1000)))
            }
            TableFlavor::People | TableFlavor::Orders => {
                Value::Text(pick(rng, PERSON_NAMES).to_string())
            }
            TableFlavor::Generic => Value::Text(format!("Sample {} {}", column, row)),
        };
    }

    match infer_column_type(column) {
        "INTEGER" => {
            if name.contains("active") || name.contains("is") || name.contains("has")
                || name.contains("flag") || name.contains("enabled")
            {
                Value::Integer(rng.gen_range(0..=1))
            } else if name.contains("id") {
                Value::Integer(rng.gen_range(1..=20))
            } else {
                Value::Integer(rng.gen_range(0..=100))
            }
        }
        "REAL" => Value::Real(rng.gen_range(100..=50_000) as f64 / 100.0),
        _ => {
            if ["date", "time", "created", "updated", "modified"]
                .iter()
                .any(|k| name.contains(k))
            {
                Value::Text(format!(
                    "2024-{:02}-{:02}",
                    rng.gen_range(1..=12),
                    rng.gen_range(1..=28)
                ))
            } else {
                Value::Text(format!("Sample {} {}", column, row))
            }
        }
    }
}
