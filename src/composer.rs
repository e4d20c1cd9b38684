use std::{cmp::Ordering, str::FromStr, sync::Arc};

use serde_json::{Number, Value};

use crate::{
    error::GatewayError,
    models::{DataRequest, DeleteData, Identity, RawFilter, SelectData, UpdateData, is_identifier},
    ownership::{OwnershipMode, OwnershipRegistry},
    repository::{Record, StoreState},
};

/// Primary-key column shared by every registered table.
pub const ID_COLUMN: &str = "id";

// --- Filters ---

/// FilterOperator
///
/// The closed set of predicates the data endpoint accepts. Parsing goes through the
/// `OPERATORS` table, so a new operator is one entry there plus its predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
}

/// Evaluates `column_value <op> filter_value`.
pub type Predicate = fn(&Value, &Value) -> bool;

const OPERATORS: [(&str, FilterOperator); 7] = [
    ("eq", FilterOperator::Eq),
    ("neq", FilterOperator::Neq),
    ("gt", FilterOperator::Gt),
    ("lt", FilterOperator::Lt),
    ("gte", FilterOperator::Gte),
    ("lte", FilterOperator::Lte),
    ("in", FilterOperator::In),
];

impl FromStr for FilterOperator {
    type Err = GatewayError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        OPERATORS
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, op)| *op)
            .ok_or_else(|| {
                GatewayError::InvalidRequest(format!("unsupported filter operator: {}", tag))
            })
    }
}

impl FilterOperator {
    pub fn tag(self) -> &'static str {
        OPERATORS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(name, _)| *name)
            .unwrap_or("eq")
    }

    /// SQL comparison symbol. `In` is rendered as containment by the Postgres store.
    pub fn sql_symbol(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Neq => "<>",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Gte => ">=",
            FilterOperator::Lte => "<=",
            FilterOperator::In => "<@",
        }
    }

    pub fn predicate(self) -> Predicate {
        match self {
            FilterOperator::Eq => values_equal,
            FilterOperator::Neq => values_differ,
            FilterOperator::Gt => greater,
            FilterOperator::Lt => less,
            FilterOperator::Gte => greater_or_equal,
            FilterOperator::Lte => less_or_equal,
            FilterOperator::In => contained_in,
        }
    }
}

// Null never compares; numbers compare numerically, strings and booleans by value.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// Integers compare exactly; f64 is only used once a float is involved.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return Some(x.cmp(&y));
    }
    // Left: a negative integer against one above i64::MAX, or the reverse.
    if x.as_i64().is_some() && y.as_u64().is_some() {
        return Some(Ordering::Less);
    }
    if x.as_u64().is_some() && y.as_i64().is_some() {
        return Some(Ordering::Greater);
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => !a.is_null() && a == b,
    }
}

fn values_differ(a: &Value, b: &Value) -> bool {
    !a.is_null() && !values_equal(a, b)
}

fn greater(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Greater)
}

fn less(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Less)
}

fn greater_or_equal(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal))
}

fn less_or_equal(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal))
}

fn contained_in(a: &Value, b: &Value) -> bool {
    b.as_array()
        .is_some_and(|items| items.iter().any(|item| values_equal(a, item)))
}

/// Filter
///
/// One conjunctive predicate. Filters are ANDed; their order carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator: FilterOperator::Eq,
            value: value.into(),
        }
    }

    pub fn parse(raw: RawFilter) -> Result<Self, GatewayError> {
        if !is_identifier(&raw.column) {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid filter column: {}",
                raw.column
            )));
        }
        let operator = raw.operator.parse::<FilterOperator>()?;
        if operator == FilterOperator::In && !raw.value.is_array() {
            return Err(GatewayError::InvalidRequest(format!(
                "filter `{}` on {} requires an array value",
                operator.tag(),
                raw.column
            )));
        }
        Ok(Self {
            column: raw.column,
            operator,
            value: raw.value,
        })
    }

    /// Missing columns read as null, which satisfies no predicate.
    pub fn matches(&self, record: &Record) -> bool {
        let current = record.get(&self.column).unwrap_or(&Value::Null);
        (self.operator.predicate())(current, &self.value)
    }
}

// --- Column selection ---

/// Columns
///
/// Projection requested by a select (`"*"` or `"id, title"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    All,
    List(Vec<String>),
}

impl Columns {
    pub fn parse(raw: Option<&str>) -> Result<Self, GatewayError> {
        let raw = match raw.map(str::trim) {
            None | Some("") | Some("*") => return Ok(Columns::All),
            Some(raw) => raw,
        };
        let columns = raw
            .split(',')
            .map(str::trim)
            .map(|column| {
                if is_identifier(column) {
                    Ok(column.to_string())
                } else {
                    Err(GatewayError::InvalidRequest(format!(
                        "invalid select column: {}",
                        column
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Columns::List(columns))
    }

    pub fn project(&self, record: &Record) -> Record {
        match self {
            Columns::All => record.clone(),
            Columns::List(columns) => columns
                .iter()
                .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
                .collect(),
        }
    }
}

// --- Action descriptor ---

/// ActionKind
///
/// The operation and the payload each kind needs. Update and Delete always carry a target id.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Insert { record: Record },
    Select { columns: Columns, filters: Vec<Filter> },
    Update { id: Value, values: Record },
    Delete { id: Value },
}

/// ActionDescriptor
///
/// Normalized form of one request to the generic data endpoint. Built per request,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    pub table: String,
    pub kind: ActionKind,
}

impl TryFrom<DataRequest> for ActionDescriptor {
    type Error = GatewayError;

    fn try_from(request: DataRequest) -> Result<Self, Self::Error> {
        let DataRequest {
            action,
            table,
            data,
        } = request;

        let kind = match action.as_str() {
            "insert" => ActionKind::Insert {
                record: record_payload(data, "data")?,
            },
            "select" => {
                let select: SelectData = payload(data)?;
                let filters = select
                    .filters
                    .unwrap_or_default()
                    .into_iter()
                    .map(Filter::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                ActionKind::Select {
                    columns: Columns::parse(select.select.as_deref())?,
                    filters,
                }
            }
            "update" => {
                let update: UpdateData = payload(data)?;
                let values = record_payload(update.values.unwrap_or(Value::Null), "values")?;
                if values.is_empty() {
                    return Err(GatewayError::InvalidRequest(
                        "`values` must not be empty".to_string(),
                    ));
                }
                if values.contains_key(ID_COLUMN) {
                    return Err(GatewayError::InvalidRequest(format!(
                        "`{}` cannot be updated",
                        ID_COLUMN
                    )));
                }
                ActionKind::Update {
                    id: target_id(update.id)?,
                    values,
                }
            }
            "delete" => {
                let delete: DeleteData = payload(data)?;
                ActionKind::Delete {
                    id: target_id(delete.id)?,
                }
            }
            other => {
                return Err(GatewayError::InvalidRequest(format!(
                    "unknown action: {}",
                    other
                )));
            }
        };

        Ok(Self { table, kind })
    }
}

fn payload<T: serde::de::DeserializeOwned + Default>(data: Value) -> Result<T, GatewayError> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

fn record_payload(data: Value, field: &str) -> Result<Record, GatewayError> {
    let Value::Object(record) = data else {
        return Err(GatewayError::InvalidRequest(format!(
            "`{}` must be an object",
            field
        )));
    };
    if let Some(bad) = record.keys().find(|key| !is_identifier(key)) {
        return Err(GatewayError::InvalidRequest(format!(
            "invalid column name: {}",
            bad
        )));
    }
    Ok(record)
}

fn target_id(id: Option<Value>) -> Result<Value, GatewayError> {
    match id {
        Some(Value::String(id)) if !id.is_empty() => Ok(Value::String(id)),
        Some(Value::Number(id)) => Ok(Value::Number(id)),
        _ => Err(GatewayError::InvalidRequest(
            "`id` is required and must be a string or number".to_string(),
        )),
    }
}

// --- Composer ---

/// QueryComposer
///
/// Turns an `ActionDescriptor` plus the caller's identity into store calls, injecting the
/// ownership constraints the registry prescribes. The caller can never override, remove or
/// contradict the owner constraint.
pub struct QueryComposer {
    registry: OwnershipRegistry,
    store: StoreState,
}

/// ComposerState
///
/// Shared handle used by the data handler.
pub type ComposerState = Arc<QueryComposer>;

impl QueryComposer {
    pub fn new(registry: OwnershipRegistry, store: StoreState) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    /// execute
    ///
    /// One store call per action, preceded by an ownership read for owned Update/Delete.
    /// No retries: a store failure is surfaced as `ExternalFailure`.
    pub async fn execute(
        &self,
        identity: &Identity,
        action: ActionDescriptor,
    ) -> Result<Value, GatewayError> {
        let ActionDescriptor { table, kind } = action;
        let mode = self
            .registry
            .policy_for(&table)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unknown table: {}", table)))?;
        let owner_column = match mode {
            OwnershipMode::OwnedByColumn(column) => Some(column.as_str()),
            OwnershipMode::Unowned => None,
        };

        match kind {
            ActionKind::Insert { mut record } => {
                if let Some(column) = owner_column {
                    // A caller-supplied owner is discarded, never merged.
                    record.insert(column.to_string(), Value::String(identity.id.clone()));
                }
                let inserted = self.store.insert(&table, record).await?;
                tracing::debug!(table = %table, "insert completed");
                Ok(Value::Object(inserted))
            }
            ActionKind::Select {
                columns,
                mut filters,
            } => {
                if let Some(column) = owner_column {
                    filters.push(Filter::eq(column, identity.id.clone()));
                }
                let rows = self.store.select_where(&table, &columns, &filters).await?;
                tracing::debug!(table = %table, rows = rows.len(), "select completed");
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            ActionKind::Update { id, mut values } => {
                if let Some(column) = owner_column {
                    self.ensure_owner(&table, column, &id, identity).await?;
                    values.insert(column.to_string(), Value::String(identity.id.clone()));
                }
                let updated = self.store.update_where(&table, &id, values).await?;
                Ok(updated.map(Value::Object).unwrap_or(Value::Null))
            }
            ActionKind::Delete { id } => {
                if let Some(column) = owner_column {
                    self.ensure_owner(&table, column, &id, identity).await?;
                }
                let deleted = self.store.delete_where(&table, &id).await?;
                Ok(deleted.map(Value::Object).unwrap_or(Value::Null))
            }
        }
    }

    /// ensure_owner
    ///
    /// Read-before-write check: the target row must exist and belong to the caller.
    /// Must complete before the mutation is issued. Not atomic with the write that follows.
    async fn ensure_owner(
        &self,
        table: &str,
        owner_column: &str,
        id: &Value,
        identity: &Identity,
    ) -> Result<(), GatewayError> {
        let columns = Columns::List(vec![owner_column.to_string()]);
        let rows = self
            .store
            .select_where(table, &columns, &[Filter::eq(ID_COLUMN, id.clone())])
            .await?;

        let owned = rows
            .first()
            .and_then(|row| row.get(owner_column))
            .and_then(Value::as_str)
            .is_some_and(|owner| owner == identity.id);

        if owned {
            Ok(())
        } else {
            tracing::warn!(table = %table, id = %id, "ownership check rejected mutation");
            Err(GatewayError::Forbidden(format!(
                "record {} in {} is not owned by the caller",
                id, table
            )))
        }
    }
}
