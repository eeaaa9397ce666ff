//! Generic table client the relational backend delegates to.
//!
//! Every call names its table at runtime, so one client serves every
//! registered resource without per-entity code.

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Condition, Expr, Order, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, FromQueryResult, JsonValue};

use domain::{Identifier, Record};

use super::translate::{self, Assignments};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Arguments of a paged, projected select.
#[derive(Debug, Clone)]
pub struct FindManyArgs {
    pub condition: Condition,
    pub order_by: Vec<(String, Order)>,
    pub select: Vec<String>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl FindManyArgs {
    pub fn new(condition: Condition, select: Vec<String>) -> Self {
        Self {
            condition,
            order_by: translate::order_by(None),
            select,
            skip: None,
            take: None,
        }
    }
}

/// CRUD over a named table.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait OrmClient: Send + Sync {
    async fn find_many(&self, table: &str, args: FindManyArgs) -> Result<Vec<Record>, DbErr>;

    async fn count(&self, table: &str, condition: Condition) -> Result<u64, DbErr>;

    async fn find_unique(
        &self,
        table: &str,
        id: &Identifier,
        select: &[String],
    ) -> Result<Option<Record>, DbErr>;

    /// Insert a row (the assignments carry its id) and read it back
    async fn create(
        &self,
        table: &str,
        id: &Identifier,
        data: Assignments,
        select: &[String],
    ) -> Result<Record, DbErr>;

    /// `None` when no row has the id
    async fn update(
        &self,
        table: &str,
        id: &Identifier,
        data: Assignments,
        select: &[String],
    ) -> Result<Option<Record>, DbErr>;

    async fn update_many(
        &self,
        table: &str,
        ids: &[Identifier],
        data: Assignments,
    ) -> Result<u64, DbErr>;

    /// Remove a row, returning it; `None` when no row has the id
    async fn delete(
        &self,
        table: &str,
        id: &Identifier,
        select: &[String],
    ) -> Result<Option<Record>, DbErr>;

    async fn delete_many(&self, table: &str, ids: &[Identifier]) -> Result<u64, DbErr>;
}

/// [`OrmClient`] over a SeaORM connection, using dynamic SeaQuery statements.
#[derive(Clone)]
pub struct SeaOrmClient {
    db: DatabaseConnection,
}

impl SeaOrmClient {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }
}

fn into_record(value: JsonValue) -> Result<Record, DbErr> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(DbErr::Custom(format!("expected a row object, got {}", other))),
    }
}

#[async_trait]
impl OrmClient for SeaOrmClient {
    async fn find_many(&self, table: &str, args: FindManyArgs) -> Result<Vec<Record>, DbErr> {
        let mut stmt = Query::select();
        stmt.columns(args.select.iter().map(|c| Alias::new(c.as_str())))
            .from(Alias::new(table))
            .cond_where(args.condition);
        for (field, order) in args.order_by {
            stmt.order_by(Alias::new(field), order);
        }
        if let Some(take) = args.take {
            stmt.limit(take);
        }
        if let Some(skip) = args.skip {
            stmt.offset(skip);
        }

        let rows = JsonValue::find_by_statement(self.backend().build(&stmt))
            .all(&self.db)
            .await?;
        rows.into_iter().map(into_record).collect()
    }

    async fn count(&self, table: &str, condition: Condition) -> Result<u64, DbErr> {
        let mut stmt = Query::select();
        stmt.expr_as(Expr::cust("COUNT(*)"), Alias::new("count"))
            .from(Alias::new(table))
            .cond_where(condition);

        let count: i64 = match self.db.query_one(self.backend().build(&stmt)).await? {
            Some(row) => row.try_get::<i64>("", "count")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    async fn find_unique(
        &self,
        table: &str,
        id: &Identifier,
        select: &[String],
    ) -> Result<Option<Record>, DbErr> {
        let mut args = FindManyArgs::new(
            Condition::all().add(translate::id_equals(id)),
            select.to_vec(),
        );
        args.order_by.clear();
        args.take = Some(1);
        Ok(self.find_many(table, args).await?.into_iter().next())
    }

    async fn create(
        &self,
        table: &str,
        id: &Identifier,
        data: Assignments,
        select: &[String],
    ) -> Result<Record, DbErr> {
        let (columns, values): (Vec<Alias>, Vec<_>) = data
            .into_iter()
            .map(|(column, value)| (Alias::new(column), value))
            .unzip();

        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(table)).columns(columns);
        stmt.values(values)
            .map_err(|e| DbErr::Custom(e.to_string()))?;
        self.db.execute(self.backend().build(&stmt)).await?;

        self.find_unique(table, id, select)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("{} {} after insert", table, id)))
    }

    async fn update(
        &self,
        table: &str,
        id: &Identifier,
        data: Assignments,
        select: &[String],
    ) -> Result<Option<Record>, DbErr> {
        let mut stmt = Query::update();
        stmt.table(Alias::new(table))
            .values(data.into_iter().map(|(column, value)| (Alias::new(column), value)))
            .cond_where(translate::id_equals(id));

        let result = self.db.execute(self.backend().build(&stmt)).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_unique(table, id, select).await
    }

    async fn update_many(
        &self,
        table: &str,
        ids: &[Identifier],
        data: Assignments,
    ) -> Result<u64, DbErr> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut stmt = Query::update();
        stmt.table(Alias::new(table))
            .values(data.into_iter().map(|(column, value)| (Alias::new(column), value)))
            .cond_where(translate::id_in(ids));

        let result = self.db.execute(self.backend().build(&stmt)).await?;
        Ok(result.rows_affected())
    }

    async fn delete(
        &self,
        table: &str,
        id: &Identifier,
        select: &[String],
    ) -> Result<Option<Record>, DbErr> {
        let Some(record) = self.find_unique(table, id, select).await? else {
            return Ok(None);
        };

        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(table))
            .cond_where(translate::id_equals(id));
        self.db.execute(self.backend().build(&stmt)).await?;

        Ok(Some(record))
    }

    async fn delete_many(&self, table: &str, ids: &[Identifier]) -> Result<u64, DbErr> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(table))
            .cond_where(translate::id_in(ids));

        let result = self.db.execute(self.backend().build(&stmt)).await?;
        Ok(result.rows_affected())
    }
}
