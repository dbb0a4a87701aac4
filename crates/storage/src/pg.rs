//! PostgreSQL adapter
//!
//! Translates the statement catalogue into parametrized SQL against
//! `mutations_foncieres` using the synchronous `postgres` client. Every
//! parameter carries an explicit cast so the server never has to guess types,
//! and aggregates are cast to `float8`/`int8` so rows decode the same way
//! whatever the column types are.
//!
//! Transactions are opened with `BEGIN ISOLATION LEVEL ...`, so the level is
//! fixed per transaction exactly like the driver-level setting.

use crate::session::{Session, StoreClient};
use postgres::error::SqlState;
use postgres::{Client, NoTls};
use tracing::debug;
use txanomaly_core::{
    Datum, ExecResult, IsolationLevel, Row, Statement, StoreConfig, StoreError, StoreResult,
};

const RECORD_COLUMNS: &str = "id::int8, id_mutation, date_mutation::date, valeur_fonciere::float8, \
                              code_commune, nom_commune, code_postal, type_local";

/// Map a driver error onto the store taxonomy.
pub fn classify(error: &postgres::Error) -> StoreError {
    if error.code() == Some(&SqlState::T_R_SERIALIZATION_FAILURE)
        || error.code() == Some(&SqlState::T_R_DEADLOCK_DETECTED)
    {
        return StoreError::serialization(error.to_string());
    }
    if error.is_closed() || error.as_db_error().is_none() {
        return StoreError::connection(error.to_string());
    }
    StoreError::generic(error.to_string())
}

/// [`StoreClient`] opening one PostgreSQL connection per session
#[derive(Debug, Clone)]
pub struct PostgresClient {
    config: StoreConfig,
}

impl PostgresClient {
    /// Client for the configured server
    pub fn new(config: StoreConfig) -> Self {
        PostgresClient { config }
    }

    fn connection_params(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.config.host,
            self.config.port,
            self.config.dbname,
            self.config.user,
            self.config.password
        )
    }
}

impl StoreClient for PostgresClient {
    fn connect(&self) -> StoreResult<Box<dyn Session>> {
        let client = Client::connect(&self.connection_params(), NoTls)
            .map_err(|e| StoreError::connection(e.to_string()))?;
        debug!(store = %self.config.display_target(), "postgres session opened");
        Ok(Box::new(PostgresSession {
            client: Some(client),
            isolation: IsolationLevel::ReadCommitted,
            autocommit: false,
            in_transaction: false,
        }))
    }

    fn describe(&self) -> String {
        self.config.display_target()
    }
}

/// One PostgreSQL connection
pub struct PostgresSession {
    client: Option<Client>,
    isolation: IsolationLevel,
    autocommit: bool,
    in_transaction: bool,
}

impl PostgresSession {
    fn client(&mut self) -> StoreResult<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| StoreError::connection("connection already closed"))
    }

    fn batch(&mut self, sql: &str) -> StoreResult<()> {
        self.client()?.batch_execute(sql).map_err(|e| classify(&e))
    }

    fn open_transaction(&mut self) -> StoreResult<()> {
        let sql = format!("BEGIN ISOLATION LEVEL {}", self.isolation.sql_name());
        self.batch(&sql)?;
        self.in_transaction = true;
        Ok(())
    }
}

impl Session for PostgresSession {
    fn set_isolation(&mut self, level: IsolationLevel) -> StoreResult<()> {
        self.client()?;
        if self.in_transaction {
            return Err(StoreError::generic(
                "SET TRANSACTION ISOLATION LEVEL must be called before any query",
            ));
        }
        self.isolation = level;
        Ok(())
    }

    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn set_autocommit(&mut self, autocommit: bool) -> StoreResult<()> {
        self.client()?;
        if self.in_transaction {
            return Err(StoreError::generic(
                "autocommit cannot be changed inside a transaction",
            ));
        }
        self.autocommit = autocommit;
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<()> {
        if self.in_transaction {
            return Err(StoreError::generic("there is already a transaction in progress"));
        }
        self.open_transaction()
    }

    fn execute(&mut self, statement: &Statement) -> StoreResult<ExecResult> {
        if !self.in_transaction && !self.autocommit {
            self.open_transaction()?;
        }
        debug!(statement = statement.name(), "execute");
        let client = self.client()?;
        run(client, statement).map_err(|e| classify(&e))
    }

    fn commit(&mut self) -> StoreResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> StoreResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.batch("ROLLBACK")
    }

    fn close(&mut self) -> StoreResult<()> {
        self.in_transaction = false;
        if let Some(client) = self.client.take() {
            client.close().map_err(|e| classify(&e))?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

fn rows_of(
    rows: Vec<postgres::Row>,
    decode: impl Fn(&postgres::Row) -> Result<Row, postgres::Error>,
) -> Result<ExecResult, postgres::Error> {
    let decoded = rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?;
    Ok(ExecResult::Rows(decoded))
}

fn int(row: &postgres::Row, i: usize) -> Result<Datum, postgres::Error> {
    Ok(row
        .try_get::<_, Option<i64>>(i)?
        .map(Datum::Int)
        .unwrap_or(Datum::Null))
}

fn float(row: &postgres::Row, i: usize) -> Result<Datum, postgres::Error> {
    Ok(row
        .try_get::<_, Option<f64>>(i)?
        .map(Datum::Float)
        .unwrap_or(Datum::Null))
}

fn text(row: &postgres::Row, i: usize) -> Result<Datum, postgres::Error> {
    Ok(row
        .try_get::<_, Option<String>>(i)?
        .map(Datum::Text)
        .unwrap_or(Datum::Null))
}

fn date(row: &postgres::Row, i: usize) -> Result<Datum, postgres::Error> {
    Ok(row
        .try_get::<_, Option<chrono::NaiveDate>>(i)?
        .map(Datum::Date)
        .unwrap_or(Datum::Null))
}

fn record(row: &postgres::Row) -> Result<Row, postgres::Error> {
    Ok(Row(vec![
        int(row, 0)?,
        text(row, 1)?,
        date(row, 2)?,
        float(row, 3)?,
        text(row, 4)?,
        text(row, 5)?,
        text(row, 6)?,
        text(row, 7)?,
    ]))
}

fn run(client: &mut Client, statement: &Statement) -> Result<ExecResult, postgres::Error> {
    let affected = ExecResult::RowsAffected;
    match statement {
        Statement::SelectValue { id } => rows_of(
            client.query(
                "SELECT valeur_fonciere::float8 FROM mutations_foncieres WHERE id = $1::int8",
                &[&id.as_i64()],
            )?,
            |r| Ok(Row(vec![float(r, 0)?])),
        ),
        Statement::SelectRecord { id } => rows_of(
            client.query(
                format!(
                    "SELECT {} FROM mutations_foncieres WHERE id = $1::int8",
                    RECORD_COLUMNS
                )
                .as_str(),
                &[&id.as_i64()],
            )?,
            record,
        ),
        Statement::CountAll => rows_of(
            client.query("SELECT COUNT(*)::int8 FROM mutations_foncieres", &[])?,
            |r| Ok(Row(vec![int(r, 0)?])),
        ),
        Statement::SelectIdAt { offset } => {
            let offset = i64::try_from(*offset).unwrap_or(i64::MAX);
            rows_of(
                client.query(
                    "SELECT id::int8 FROM mutations_foncieres ORDER BY id OFFSET $1::int8 LIMIT 1",
                    &[&offset],
                )?,
                |r| Ok(Row(vec![int(r, 0)?])),
            )
        }
        Statement::SelectGroupName { group_code } => rows_of(
            client.query(
                "SELECT nom_commune FROM mutations_foncieres WHERE code_commune = $1::text \
                 ORDER BY id LIMIT 1",
                &[group_code],
            )?,
            |r| Ok(Row(vec![text(r, 0)?])),
        ),
        Statement::SelectGroupNames { group_code } => rows_of(
            client.query(
                "SELECT id::int8, nom_commune FROM mutations_foncieres WHERE code_commune = $1::text \
                 ORDER BY id",
                &[group_code],
            )?,
            |r| Ok(Row(vec![int(r, 0)?, text(r, 1)?])),
        ),
        Statement::AverageGroupValue { group_code } => rows_of(
            client.query(
                "SELECT AVG(valeur_fonciere)::float8 FROM mutations_foncieres \
                 WHERE code_commune = $1::text",
                &[group_code],
            )?,
            |r| Ok(Row(vec![float(r, 0)?])),
        ),
        Statement::CountQualifying {
            group_code,
            min_value,
        } => rows_of(
            client.query(
                "SELECT COUNT(*)::int8 FROM mutations_foncieres \
                 WHERE code_commune = $1::text AND valeur_fonciere >= $2::float8",
                &[group_code, min_value],
            )?,
            |r| Ok(Row(vec![int(r, 0)?])),
        ),
        Statement::InsertRecord(new) => rows_of(
            client.query(
                "INSERT INTO mutations_foncieres \
                 (id_mutation, date_mutation, nature_mutation, valeur_fonciere, code_commune, \
                  nom_commune, code_postal, type_local) \
                 VALUES ($1::text, $2::date, 'Vente', $3::float8, $4::text, $5::text, $6::text, $7::text) \
                 RETURNING id::int8",
                &[
                    &new.mutation_ref,
                    &new.date,
                    &new.value,
                    &new.group_code,
                    &new.group_name,
                    &new.postal_code,
                    &new.property_kind,
                ],
            )?,
            |r| Ok(Row(vec![int(r, 0)?])),
        ),
        Statement::UpdateValue { id, value } => Ok(affected(client.execute(
            "UPDATE mutations_foncieres SET valeur_fonciere = $1::float8 WHERE id = $2::int8",
            &[value, &id.as_i64()],
        )?)),
        Statement::RenameGroup {
            group_code,
            old_name,
            new_name,
        } => Ok(affected(client.execute(
            "UPDATE mutations_foncieres SET nom_commune = $1::text \
             WHERE code_commune = $2::text AND nom_commune = $3::text",
            &[new_name, group_code, old_name],
        )?)),
        Statement::SetRecordName { id, name } => Ok(affected(client.execute(
            "UPDATE mutations_foncieres SET nom_commune = $1::text WHERE id = $2::int8",
            &[name, &id.as_i64()],
        )?)),
        Statement::ScaleValues {
            postal_code,
            factor,
        } => Ok(affected(client.execute(
            "UPDATE mutations_foncieres SET valeur_fonciere = valeur_fonciere * $1::float8 \
             WHERE code_postal = $2::text AND valeur_fonciere IS NOT NULL AND valeur_fonciere > 0",
            &[factor, postal_code],
        )?)),
        Statement::ValueRange { postal_code } => rows_of(
            client.query(
                "SELECT MIN(valeur_fonciere)::float8, MAX(valeur_fonciere)::float8 \
                 FROM mutations_foncieres WHERE code_postal = $1::text",
                &[postal_code],
            )?,
            |r| Ok(Row(vec![float(r, 0)?, float(r, 1)?])),
        ),
        Statement::AveragePostalValue { postal_code } => rows_of(
            client.query(
                "SELECT COALESCE(AVG(valeur_fonciere), 0.0)::float8 FROM mutations_foncieres \
                 WHERE code_postal = $1::text",
                &[postal_code],
            )?,
            |r| Ok(Row(vec![float(r, 0)?])),
        ),
        Statement::SelectPostalValues { postal_code } => rows_of(
            client.query(
                "SELECT id::int8, valeur_fonciere::float8 FROM mutations_foncieres \
                 WHERE code_postal = $1::text ORDER BY id",
                &[postal_code],
            )?,
            |r| Ok(Row(vec![int(r, 0)?, float(r, 1)?])),
        ),
        Statement::CountOlderThan { cutoff } => rows_of(
            client.query(
                "SELECT COUNT(*)::int8 FROM mutations_foncieres WHERE date_mutation < $1::date",
                &[cutoff],
            )?,
            |r| Ok(Row(vec![int(r, 0)?])),
        ),
        Statement::DeleteOlderThan { cutoff } => Ok(affected(client.execute(
            "DELETE FROM mutations_foncieres WHERE date_mutation < $1::date",
            &[cutoff],
        )?)),
        Statement::CountMarked { marker } => rows_of(
            client.query(
                "SELECT COUNT(*)::int8 FROM mutations_foncieres WHERE id_mutation = $1::text",
                &[marker],
            )?,
            |r| Ok(Row(vec![int(r, 0)?])),
        ),
        Statement::DeleteMarked { marker } => Ok(affected(client.execute(
            "DELETE FROM mutations_foncieres WHERE id_mutation = $1::text",
            &[marker],
        )?)),
    }
}
