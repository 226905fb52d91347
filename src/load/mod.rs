// src/load/mod.rs

use crate::table::{Cell, CrimeTable};
use anyhow::{Context, Result};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::info;

/// One-time warehouse layout: the staging landing zone plus the star schema.
/// Every statement is IF NOT EXISTS so re-running a load is safe, and the
/// whole batch commits as one transaction. Dimension value columns are
/// UNIQUE, which is what makes insert-if-absent hold; surrogate keys come
/// from sequences. Referential integrity is enforced by the join-based fact
/// population rather than declared constraints.
const CREATE_SQL: &str = "
BEGIN TRANSACTION;

CREATE SCHEMA IF NOT EXISTS staging;
CREATE SCHEMA IF NOT EXISTS core;

CREATE TABLE IF NOT EXISTS staging.crime (
    park                        VARCHAR,
    borough                     VARCHAR,
    acres                       DOUBLE,
    category                    VARCHAR,
    murder                      BIGINT,
    rape                        BIGINT,
    robbery                     BIGINT,
    felony_assault              BIGINT,
    burglary                    BIGINT,
    grand_larceny               BIGINT,
    grand_larceny_motor_vehicle BIGINT,
    year                        VARCHAR,
    quarter                     VARCHAR
);

CREATE SEQUENCE IF NOT EXISTS core.dim_year_id_seq;
CREATE SEQUENCE IF NOT EXISTS core.dim_quarter_id_seq;
CREATE SEQUENCE IF NOT EXISTS core.dim_park_id_seq;
CREATE SEQUENCE IF NOT EXISTS core.dim_borough_id_seq;
CREATE SEQUENCE IF NOT EXISTS core.dim_category_id_seq;
CREATE SEQUENCE IF NOT EXISTS core.fact_crime_id_seq;

-- dimension tables --
CREATE TABLE IF NOT EXISTS core.dim_year (
    year_id BIGINT PRIMARY KEY DEFAULT nextval('core.dim_year_id_seq'),
    year    VARCHAR UNIQUE
);

CREATE TABLE IF NOT EXISTS core.dim_quarter (
    qtr_id  BIGINT PRIMARY KEY DEFAULT nextval('core.dim_quarter_id_seq'),
    quarter VARCHAR UNIQUE
);

CREATE TABLE IF NOT EXISTS core.dim_park (
    park_id BIGINT PRIMARY KEY DEFAULT nextval('core.dim_park_id_seq'),
    park    VARCHAR UNIQUE
);

CREATE TABLE IF NOT EXISTS core.dim_borough (
    borough_id BIGINT PRIMARY KEY DEFAULT nextval('core.dim_borough_id_seq'),
    borough    VARCHAR UNIQUE
);

CREATE TABLE IF NOT EXISTS core.dim_category (
    category_id BIGINT PRIMARY KEY DEFAULT nextval('core.dim_category_id_seq'),
    category    VARCHAR UNIQUE
);

-- fact table --
CREATE TABLE IF NOT EXISTS core.fact_crime (
    crime_id                    BIGINT PRIMARY KEY DEFAULT nextval('core.fact_crime_id_seq'),
    year_id                     BIGINT,
    qtr_id                      BIGINT,
    park_id                     BIGINT,
    borough_id                  BIGINT,
    acres                       DOUBLE,
    category_id                 BIGINT,
    murder                      BIGINT,
    rape                        BIGINT,
    robbery                     BIGINT,
    felony_assault              BIGINT,
    burglary                    BIGINT,
    grand_larceny               BIGINT,
    grand_larceny_motor_vehicle BIGINT
);

COMMIT;
";

const INSERT_STAGING_SQL: &str = "
INSERT INTO staging.crime (
    park, borough, acres, category,
    murder, rape, robbery, felony_assault, burglary,
    grand_larceny, grand_larceny_motor_vehicle,
    year, quarter
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

/// Insert-if-absent for each dimension, then the fact rows through inner
/// joins on the natural keys. A staging row whose key finds no dimension
/// match (a NULL key, in practice) produces no fact row.
const POPULATE_SQL: &str = "
BEGIN TRANSACTION;

INSERT INTO core.dim_year (year)
SELECT DISTINCT s.year FROM staging.crime s
WHERE NOT EXISTS (SELECT 1 FROM core.dim_year d WHERE d.year = s.year);

INSERT INTO core.dim_quarter (quarter)
SELECT DISTINCT s.quarter FROM staging.crime s
WHERE NOT EXISTS (SELECT 1 FROM core.dim_quarter d WHERE d.quarter = s.quarter);

INSERT INTO core.dim_park (park)
SELECT DISTINCT s.park FROM staging.crime s
WHERE NOT EXISTS (SELECT 1 FROM core.dim_park d WHERE d.park = s.park);

INSERT INTO core.dim_borough (borough)
SELECT DISTINCT s.borough FROM staging.crime s
WHERE NOT EXISTS (SELECT 1 FROM core.dim_borough d WHERE d.borough = s.borough);

INSERT INTO core.dim_category (category)
SELECT DISTINCT s.category FROM staging.crime s
WHERE NOT EXISTS (SELECT 1 FROM core.dim_category d WHERE d.category = s.category);

INSERT INTO core.fact_crime (
    year_id, qtr_id, park_id, borough_id, acres, category_id,
    murder, rape, robbery, felony_assault, burglary,
    grand_larceny, grand_larceny_motor_vehicle
)
SELECT y.year_id, q.qtr_id, p.park_id, b.borough_id, s.acres, c.category_id,
       s.murder, s.rape, s.robbery, s.felony_assault, s.burglary,
       s.grand_larceny, s.grand_larceny_motor_vehicle
FROM staging.crime s
JOIN core.dim_year     y ON s.year = y.year
JOIN core.dim_quarter  q ON s.quarter = q.quarter
JOIN core.dim_park     p ON s.park = p.park
JOIN core.dim_borough  b ON s.borough = b.borough
JOIN core.dim_category c ON s.category = c.category;

COMMIT;
";

/// The literal 'NaN' is how float NaN lands in a VARCHAR column; turn those
/// placeholders into true NULLs after the fact rows are in.
const NULL_FIX_SQL: &str = "
BEGIN TRANSACTION;

UPDATE core.dim_year     SET year = NULL     WHERE year = 'NaN';
UPDATE core.dim_quarter  SET quarter = NULL  WHERE quarter = 'NaN';
UPDATE core.dim_park     SET park = NULL     WHERE park = 'NaN';
UPDATE core.dim_borough  SET borough = NULL  WHERE borough = 'NaN';
UPDATE core.dim_category SET category = NULL WHERE category = 'NaN';

COMMIT;
";

/// The thirteen staging columns in insert order, resolved once per load
/// against the transformed table's headers.
struct StagingColumns {
    park: usize,
    borough: usize,
    acres: usize,
    category: usize,
    murder: usize,
    rape: usize,
    robbery: usize,
    felony_assault: usize,
    burglary: usize,
    grand_larceny: usize,
    grand_larceny_motor_vehicle: usize,
    year: usize,
    quarter: usize,
}

impl StagingColumns {
    fn resolve(table: &CrimeTable) -> Result<Self> {
        let col = |name: &str| {
            table
                .column(name)
                .with_context(|| format!("transformed data is missing column {:?}", name))
        };
        Ok(Self {
            park: col("park")?,
            borough: col("borough")?,
            acres: col("acres")?,
            category: col("category")?,
            murder: col("murder")?,
            rape: col("rape")?,
            robbery: col("robbery")?,
            felony_assault: col("felony_assault")?,
            burglary: col("burglary")?,
            grand_larceny: col("grand_larceny")?,
            grand_larceny_motor_vehicle: col("grand_larceny_motor_vehicle")?,
            year: col("year")?,
            quarter: col("quarter")?,
        })
    }
}

fn cell(row: &[Cell], idx: usize) -> &Cell {
    row.get(idx).unwrap_or(&Cell::Null)
}

/// Row counts across the warehouse after a load. Observational only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowCounts {
    pub staging: i64,
    pub fact: i64,
    pub dim_year: i64,
    pub dim_quarter: i64,
    pub dim_park: i64,
    pub dim_borough: i64,
    pub dim_category: i64,
}

impl RowCounts {
    pub fn report(&self) {
        info!("staging.crime: {} row(s)", self.staging);
        info!("core.fact_crime: {} row(s)", self.fact);
        info!("core.dim_year: {} row(s)", self.dim_year);
        info!("core.dim_quarter: {} row(s)", self.dim_quarter);
        info!("core.dim_park: {} row(s)", self.dim_park);
        info!("core.dim_borough: {} row(s)", self.dim_borough);
        info!("core.dim_category: {} row(s)", self.dim_category);
    }
}

/// An open warehouse connection. Held for the duration of one load and
/// released when the value goes out of scope, on every exit path.
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open warehouse {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory warehouse")?;
        Ok(Self { conn })
    }

    /// Phase 1: idempotent schema creation.
    pub fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(CREATE_SQL)?;
        Ok(())
    }

    /// Phase 2: append every transformed row into the staging table,
    /// one parameterized insert per row, one transaction for the batch.
    /// No truncation and no dedup — a re-run appends duplicates.
    pub fn stage(&self, table: &CrimeTable) -> Result<usize> {
        let cols = StagingColumns::resolve(table)?;

        self.conn.execute_batch("BEGIN TRANSACTION;")?;
        match self.insert_rows(table, &cols) {
            Ok(n) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(n)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    fn insert_rows(&self, table: &CrimeTable, cols: &StagingColumns) -> Result<usize> {
        let mut stmt = self.conn.prepare(INSERT_STAGING_SQL)?;
        for (rowno, row) in table.rows.iter().enumerate() {
            self.insert_row(&mut stmt, row, cols)
                .with_context(|| format!("staging insert failed at row {}", rowno))?;
        }
        Ok(table.rows.len())
    }

    fn insert_row(
        &self,
        stmt: &mut duckdb::Statement<'_>,
        row: &[Cell],
        cols: &StagingColumns,
    ) -> Result<()> {
        stmt.execute(params![
            cell(row, cols.park).to_text(),
            cell(row, cols.borough).to_text(),
            cell(row, cols.acres).to_f64()?,
            cell(row, cols.category).to_text(),
            cell(row, cols.murder).to_i64()?,
            cell(row, cols.rape).to_i64()?,
            cell(row, cols.robbery).to_i64()?,
            cell(row, cols.felony_assault).to_i64()?,
            cell(row, cols.burglary).to_i64()?,
            cell(row, cols.grand_larceny).to_i64()?,
            cell(row, cols.grand_larceny_motor_vehicle).to_i64()?,
            cell(row, cols.year).to_text(),
            cell(row, cols.quarter).to_text(),
        ])?;
        Ok(())
    }

    /// Phase 3: distinct dimension values, then fact rows.
    pub fn populate_star(&self) -> Result<()> {
        self.conn.execute_batch(POPULATE_SQL)?;
        Ok(())
    }

    /// Phase 4: 'NaN' placeholders in dimension values become NULL.
    pub fn correct_nulls(&self) -> Result<()> {
        self.conn.execute_batch(NULL_FIX_SQL)?;
        Ok(())
    }

    pub fn row_counts(&self) -> Result<RowCounts> {
        Ok(RowCounts {
            staging: self.count("staging.crime")?,
            fact: self.count("core.fact_crime")?,
            dim_year: self.count("core.dim_year")?,
            dim_quarter: self.count("core.dim_quarter")?,
            dim_park: self.count("core.dim_park")?,
            dim_borough: self.count("core.dim_borough")?,
            dim_category: self.count("core.dim_category")?,
        })
    }

    fn count(&self, table: &str) -> Result<i64> {
        let n = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .with_context(|| format!("counting rows in {}", table))?;
        Ok(n)
    }
}

/// Run the four load phases in order against an open warehouse, then report
/// row counts. The first failing phase halts the run; phases already
/// committed stay committed.
pub fn load(warehouse: &Warehouse, table: &CrimeTable) -> Result<RowCounts> {
    info!("creating warehouse tables");
    warehouse
        .create_schema()
        .context("schema creation failed")?;

    info!("inserting {} row(s) into the staging table", table.len());
    warehouse
        .stage(table)
        .context("staging insert failed")?;

    info!("populating dimension and fact tables");
    warehouse
        .populate_star()
        .context("dimension/fact population failed")?;

    info!("correcting null placeholders");
    warehouse
        .correct_nulls()
        .context("null correction failed")?;

    let counts = warehouse.row_counts().context("row count report failed")?;
    counts.report();
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract, transform};
    use rust_xlsxwriter::Workbook;
    use std::path::Path;
    use tempfile::TempDir;

    const HEADERS: [&str; 13] = [
        "park",
        "borough",
        "acres",
        "category",
        "murder",
        "rape",
        "robbery",
        "felony_assault",
        "burglary",
        "grand_larceny",
        "grand_larceny_motor_vehicle",
        "year",
        "quarter",
    ];

    /// A table already in post-transform shape: one row per
    /// (park, borough, category) with zeroed counts.
    fn staged(rows: &[(Cell, &str, &str)]) -> CrimeTable {
        let mut table = CrimeTable::new(HEADERS.iter().map(|s| s.to_string()).collect());
        for (park, borough, category) in rows {
            table.rows.push(vec![
                park.clone(),
                Cell::Text(borough.to_string()),
                Cell::Float(10.0),
                Cell::Text(category.to_string()),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Int(2020),
                Cell::Text("Qtr1".to_string()),
            ]);
        }
        table
    }

    fn park(name: &str) -> Cell {
        Cell::Text(name.to_string())
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.create_schema().unwrap();
        wh.create_schema().unwrap();
    }

    #[test]
    fn staging_appends_without_dedup() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.create_schema().unwrap();

        let table = staged(&[(park("A"), "Bronx", "Robbery"), (park("B"), "Queens", "Robbery")]);
        wh.stage(&table).unwrap();
        assert_eq!(wh.row_counts().unwrap().staging, 2);

        wh.stage(&table).unwrap();
        assert_eq!(wh.row_counts().unwrap().staging, 4);
    }

    #[test]
    fn dimension_population_is_a_set() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.create_schema().unwrap();

        // the same park twice in staging, and populate runs twice
        let table = staged(&[
            (park("A"), "Bronx", "Robbery"),
            (park("A"), "Bronx", "Burglary"),
        ]);
        wh.stage(&table).unwrap();
        wh.populate_star().unwrap();
        wh.populate_star().unwrap();

        let counts = wh.row_counts().unwrap();
        assert_eq!(counts.dim_park, 1);
        assert_eq!(counts.dim_borough, 1);
        assert_eq!(counts.dim_category, 2);
        assert_eq!(counts.dim_year, 1);
        assert_eq!(counts.dim_quarter, 1);
    }

    #[test]
    fn fact_rows_with_unmatched_keys_are_dropped() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.create_schema().unwrap();

        // a NULL park never joins its dimension, so the row stages but
        // produces no fact row
        let table = staged(&[
            (park("A"), "Bronx", "Robbery"),
            (Cell::Null, "Bronx", "Robbery"),
            (park("B"), "Queens", "Robbery"),
        ]);
        wh.stage(&table).unwrap();
        wh.populate_star().unwrap();

        let counts = wh.row_counts().unwrap();
        assert_eq!(counts.staging, 3);
        assert_eq!(counts.fact, 2);
    }

    #[test]
    fn nan_placeholders_become_null() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.create_schema().unwrap();

        // a NaN park lands in staging as the literal 'NaN', joins like any
        // other value, and is corrected to NULL afterwards
        let table = staged(&[
            (Cell::Float(f64::NAN), "Bronx", "Robbery"),
            (park("A"), "Bronx", "Robbery"),
        ]);
        wh.stage(&table).unwrap();
        wh.populate_star().unwrap();

        let nan_rows: i64 = wh
            .conn
            .query_row(
                "SELECT COUNT(*) FROM staging.crime WHERE park = 'NaN'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(nan_rows, 1);
        assert_eq!(wh.row_counts().unwrap().fact, 2);

        wh.correct_nulls().unwrap();
        let nan_dims: i64 = wh
            .conn
            .query_row(
                "SELECT COUNT(*) FROM core.dim_park WHERE park = 'NaN'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        let null_dims: i64 = wh
            .conn
            .query_row(
                "SELECT COUNT(*) FROM core.dim_park WHERE park IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(nan_dims, 0);
        assert_eq!(null_dims, 1);
    }

    #[test]
    fn staging_rejects_non_numeric_counts() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.create_schema().unwrap();

        let mut table = staged(&[(park("A"), "Bronx", "Robbery"), (park("B"), "Queens", "Robbery")]);
        table.rows[1][5] = Cell::Text("three".into()); // rape column
        assert!(wh.stage(&table).is_err());
        // the rows inserted before the failure rolled back with the batch
        assert_eq!(wh.row_counts().unwrap().staging, 0);
    }

    // ── end-to-end: two quarterly workbooks through every stage ──────────

    fn write_quarterly_report(path: &Path, rows: &[(&str, &str, f64, &str)]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();

        sheet.write_string(0, 0, "NYC Park Crime Statistics").unwrap();
        sheet.write_string(1, 0, "Produced by NYPD").unwrap();
        sheet.write_string(2, 0, "All figures preliminary").unwrap();

        let headers = [
            "Park",
            "Borough",
            "Size (Acres)",
            "Category",
            "Murder",
            "Rape",
            "Robbery",
            "Felony Assault",
            "Burglary",
            "Grand Larceny",
            "Grand Larceny of Motor Vehicle",
            "Notes",
        ];
        for (col, h) in headers.iter().enumerate() {
            sheet.write_string(3, col as u16, *h).unwrap();
        }

        let mut r = 4u32;
        for (p, b, acres, cat) in rows {
            sheet.write_string(r, 0, *p).unwrap();
            sheet.write_string(r, 1, *b).unwrap();
            sheet.write_number(r, 2, *acres).unwrap();
            sheet.write_string(r, 3, *cat).unwrap();
            for col in 4..11u16 {
                sheet.write_number(r, col, 1.0).unwrap();
            }
            sheet.write_string(r, 11, "n/a").unwrap();
            r += 1;
        }

        sheet.write_string(r, 0, "TOTAL").unwrap();
        sheet.write_number(r, 4, rows.len() as f64).unwrap();

        workbook.save(path).unwrap();
    }

    #[test]
    fn end_to_end_two_quarters() {
        let dir = TempDir::new().unwrap();
        write_quarterly_report(
            &dir.path().join("nyc-park-crime-stats-q1-2020.xlsx"),
            &[
                ("CENTRAL PARK", "Manhattan", 843.0, "Robbery"),
                ("Prospect Park", "BROOKLYN", 526.0, "Grand Larceny"),
            ],
        );
        write_quarterly_report(
            &dir.path().join("nyc-park-crime-stats-q2-2020.xlsx"),
            &[
                ("Central Park", "Manhattan", 843.0, "Robbery"),
                ("Astoria Park", "Queens", 59.7, "Robbery"),
            ],
        );

        let crime = extract::extract_all(dir.path()).unwrap();
        assert_eq!(crime.len(), 4);

        let crime = transform::transform(crime).unwrap();

        let wh = Warehouse::open_in_memory().unwrap();
        let counts = load(&wh, &crime).unwrap();

        assert_eq!(counts.staging, 4);
        assert_eq!(counts.fact, 4);
        assert_eq!(counts.dim_year, 1);
        assert_eq!(counts.dim_quarter, 2);
        assert_eq!(counts.dim_park, 3); // title-casing folds the two spellings
        assert_eq!(counts.dim_borough, 3);
        assert_eq!(counts.dim_category, 2);

        // the cleaned quarter labels reached the warehouse
        let qtr1: i64 = wh
            .conn
            .query_row(
                "SELECT COUNT(*) FROM core.dim_quarter WHERE quarter = 'Qtr1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(qtr1, 1);

        // a second staging insert appends, it does not replace
        wh.stage(&crime).unwrap();
        assert_eq!(wh.row_counts().unwrap().staging, 8);
    }
}
