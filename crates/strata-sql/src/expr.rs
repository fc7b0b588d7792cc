//! The typed expression tree.
//!
//! Expressions are a closed variant set dispatched by tag. Each variant
//! supports six operations:
//!
//! 1. [`Expr::infer_type`] — resolve the output type, unifying parameter
//!    placeholders along the way
//! 2. [`Expr::requires_type`] — assert the expression can produce a type,
//!    tightening parameter types
//! 3. [`Expr::substitute`] — replace parameter placeholders with literals
//! 4. [`Expr::reduce`] — evaluate against an optional row
//! 5. [`Expr::reduce_selectors`] — replace column selectors with the row's
//!    current values (used to inject a join's left row into the right scan)
//! 6. [`Expr::selector_ranges`] — extract `col op const` predicates into
//!    per-column scan ranges; `AND` intersects, `OR` unions per column,
//!    `!=` contributes nothing
//!
//! Comparisons in filter position treat any NULL operand as FALSE; the
//! strict ordering comparison used for ranges and grouping lives on
//! [`TypedValue::compare`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ast::{AggColSelector, AggFn, ColSelector, SelectStmt};
use crate::catalog::Table;
use crate::encoding::encode_selector;
use crate::error::{SqlError, SqlResult};
use crate::row::{ColsByName, Row};
use crate::value::{SqlType, TypedValue};

/// Bound parameter values, by name.
pub type Params = HashMap<String, TypedValue>;

/// Inferred parameter types, by name.
pub type ParamTypes = HashMap<String, SqlType>;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// The operator satisfied when operand order is swapped.
    #[must_use]
    pub fn flipped(&self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    /// `AND`
    And,
    /// `OR`
    Or,
}

/// Binary arithmetic operator over integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// System function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysFn {
    /// `NOW()`: nanoseconds since the Unix epoch, as INTEGER.
    Now,
}

/// A typed expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// NULL or a typed literal.
    Literal(TypedValue),
    /// A named bound parameter (`@name`).
    Param(String),
    /// A system function call.
    Fn(SysFn),
    /// A column selector.
    Col(ColSelector),
    /// An aggregate selector; only meaningful above a grouped reader.
    Agg(AggColSelector),
    /// Binary integer arithmetic.
    Num {
        /// Operator.
        op: NumOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Boolean negation.
    Not(Box<Expr>),
    /// Boolean connective.
    Bin {
        /// Connective.
        op: LogicOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Comparison.
    Cmp {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `col LIKE pattern`; the pattern is a regular expression.
    Like {
        /// Matched column.
        sel: ColSelector,
        /// Regular expression pattern.
        pattern: String,
    },
    /// `EXISTS (subquery)` — reports unsupported.
    Exists(Box<SelectStmt>),
}

impl Expr {
    /// Convenience constructor for `left op right` comparisons.
    #[must_use]
    pub fn cmp(left: Expr, op: CmpOp, right: Expr) -> Self {
        Self::Cmp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Convenience constructor for `col op literal`.
    #[must_use]
    pub fn col_cmp(col: &str, op: CmpOp, value: impl Into<TypedValue>) -> Self {
        Self::cmp(
            Self::Col(ColSelector::new(col)),
            op,
            Self::Literal(value.into()),
        )
    }

    /// Convenience constructor for `left AND right`.
    #[must_use]
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::Bin {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Convenience constructor for `left OR right`.
    #[must_use]
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::Bin {
            op: LogicOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Resolves the expression's output type, recording parameter
    /// placeholders as `Any` until something narrows them.
    pub fn infer_type(
        &self,
        cols: &ColsByName,
        params: &mut ParamTypes,
        implicit_db: &str,
        implicit_table: &str,
    ) -> SqlResult<SqlType> {
        match self {
            Self::Literal(v) => Ok(v.sql_type()),
            Self::Param(id) => Ok(*params.entry(id.clone()).or_insert(SqlType::Any)),
            Self::Fn(SysFn::Now) => Ok(SqlType::Integer),
            Self::Col(sel) => {
                let (db, table) = sel.resolve(implicit_db, implicit_table);
                let key = encode_selector("", db, table, &sel.col);
                cols.get(&key)
                    .map(|d| d.sql_type)
                    .ok_or(SqlError::InvalidColumn(sel.col.clone()))
            }
            Self::Agg(sel) => match sel.agg_fn {
                AggFn::Count => Ok(SqlType::Integer),
                AggFn::Sum | AggFn::Avg => {
                    let col = Self::Col(ColSelector {
                        db: sel.db.clone(),
                        table: sel.table.clone(),
                        col: sel.col.clone(),
                        as_alias: String::new(),
                    });
                    col.requires_type(SqlType::Integer, cols, params, implicit_db, implicit_table)
                        .map_err(|_| SqlError::InvalidTypes)?;
                    Ok(SqlType::Integer)
                }
                AggFn::Min | AggFn::Max => {
                    let col = Self::Col(ColSelector {
                        db: sel.db.clone(),
                        table: sel.table.clone(),
                        col: sel.col.clone(),
                        as_alias: String::new(),
                    });
                    col.infer_type(cols, params, implicit_db, implicit_table)
                }
            },
            Self::Num { left, right, .. } => {
                left.requires_type(SqlType::Integer, cols, params, implicit_db, implicit_table)?;
                right.requires_type(SqlType::Integer, cols, params, implicit_db, implicit_table)?;
                Ok(SqlType::Integer)
            }
            Self::Not(exp) => {
                exp.requires_type(SqlType::Boolean, cols, params, implicit_db, implicit_table)?;
                Ok(SqlType::Boolean)
            }
            Self::Bin { left, right, .. } => {
                left.requires_type(SqlType::Boolean, cols, params, implicit_db, implicit_table)?;
                right.requires_type(SqlType::Boolean, cols, params, implicit_db, implicit_table)?;
                Ok(SqlType::Boolean)
            }
            Self::Cmp { left, right, .. } => {
                let tl = left.infer_type(cols, params, implicit_db, implicit_table)?;
                let tr = right.infer_type(cols, params, implicit_db, implicit_table)?;

                // Unification step.
                if tl == tr || tl.satisfies(tr) {
                    return Ok(SqlType::Boolean);
                }
                if tl != SqlType::Any && tr != SqlType::Any {
                    return Err(SqlError::InvalidTypes);
                }
                if tl == SqlType::Any {
                    left.requires_type(tr, cols, params, implicit_db, implicit_table)?;
                }
                if tr == SqlType::Any {
                    right.requires_type(tl, cols, params, implicit_db, implicit_table)?;
                }
                Ok(SqlType::Boolean)
            }
            Self::Like { .. } => Ok(SqlType::Boolean),
            Self::Exists(_) => Err(SqlError::NoSupported),
        }
    }

    /// Asserts that the expression can produce `required`, narrowing
    /// parameter types along the way.
    pub fn requires_type(
        &self,
        required: SqlType,
        cols: &ColsByName,
        params: &mut ParamTypes,
        implicit_db: &str,
        implicit_table: &str,
    ) -> SqlResult<()> {
        match self {
            Self::Literal(v) => {
                let t = v.sql_type();
                if t == SqlType::Any || t.satisfies(required) {
                    Ok(())
                } else {
                    Err(SqlError::InvalidTypes)
                }
            }
            Self::Param(id) => {
                if required == SqlType::Any {
                    params.entry(id.clone()).or_insert(SqlType::Any);
                    return Ok(());
                }
                match params.get(id) {
                    Some(&curr) if curr != SqlType::Any && !curr.satisfies(required) => {
                        Err(SqlError::InferredMultipleTypes(id.clone()))
                    }
                    _ => {
                        params.insert(id.clone(), required);
                        Ok(())
                    }
                }
            }
            Self::Fn(SysFn::Now) => {
                if SqlType::Integer.satisfies(required) {
                    Ok(())
                } else {
                    Err(SqlError::InvalidTypes)
                }
            }
            Self::Col(sel) => {
                let (db, table) = sel.resolve(implicit_db, implicit_table);
                let key = encode_selector("", db, table, &sel.col);
                let desc = cols
                    .get(&key)
                    .ok_or(SqlError::InvalidColumn(sel.col.clone()))?;
                if desc.sql_type.satisfies(required) {
                    Ok(())
                } else {
                    Err(SqlError::InvalidTypes)
                }
            }
            Self::Agg(sel) => match sel.agg_fn {
                AggFn::Count | AggFn::Sum | AggFn::Avg => {
                    if !SqlType::Integer.satisfies(required) {
                        return Err(SqlError::InvalidTypes);
                    }
                    if sel.agg_fn != AggFn::Count {
                        let col = Self::Col(ColSelector {
                            db: sel.db.clone(),
                            table: sel.table.clone(),
                            col: sel.col.clone(),
                            as_alias: String::new(),
                        });
                        col.requires_type(
                            SqlType::Integer,
                            cols,
                            params,
                            implicit_db,
                            implicit_table,
                        )?;
                    }
                    Ok(())
                }
                AggFn::Min | AggFn::Max => {
                    let col = Self::Col(ColSelector {
                        db: sel.db.clone(),
                        table: sel.table.clone(),
                        col: sel.col.clone(),
                        as_alias: String::new(),
                    });
                    col.requires_type(required, cols, params, implicit_db, implicit_table)
                }
            },
            Self::Num { left, right, .. } => {
                if !SqlType::Integer.satisfies(required) {
                    return Err(SqlError::InvalidTypes);
                }
                left.requires_type(SqlType::Integer, cols, params, implicit_db, implicit_table)?;
                right.requires_type(SqlType::Integer, cols, params, implicit_db, implicit_table)
            }
            Self::Not(exp) => {
                if required != SqlType::Boolean {
                    return Err(SqlError::InvalidTypes);
                }
                exp.requires_type(SqlType::Boolean, cols, params, implicit_db, implicit_table)
            }
            Self::Bin { left, right, .. } => {
                if required != SqlType::Boolean {
                    return Err(SqlError::InvalidTypes);
                }
                left.requires_type(SqlType::Boolean, cols, params, implicit_db, implicit_table)?;
                right.requires_type(SqlType::Boolean, cols, params, implicit_db, implicit_table)
            }
            Self::Cmp { .. } => {
                if required != SqlType::Boolean {
                    return Err(SqlError::InvalidTypes);
                }
                self.infer_type(cols, params, implicit_db, implicit_table)
                    .map(|_| ())
            }
            Self::Like { .. } => {
                if required != SqlType::Boolean {
                    return Err(SqlError::InvalidTypes);
                }
                Ok(())
            }
            Self::Exists(_) => Err(SqlError::NoSupported),
        }
    }

    /// Replaces parameter placeholders with typed literals.
    pub fn substitute(&self, params: &Params) -> SqlResult<Expr> {
        match self {
            Self::Param(id) => params
                .get(id)
                .cloned()
                .map(Self::Literal)
                .ok_or_else(|| SqlError::MissingParameter(id.clone())),
            Self::Num { op, left, right } => Ok(Self::Num {
                op: *op,
                left: Box::new(left.substitute(params)?),
                right: Box::new(right.substitute(params)?),
            }),
            Self::Not(exp) => Ok(Self::Not(Box::new(exp.substitute(params)?))),
            Self::Bin { op, left, right } => Ok(Self::Bin {
                op: *op,
                left: Box::new(left.substitute(params)?),
                right: Box::new(right.substitute(params)?),
            }),
            Self::Cmp { op, left, right } => Ok(Self::Cmp {
                op: *op,
                left: Box::new(left.substitute(params)?),
                right: Box::new(right.substitute(params)?),
            }),
            _ => Ok(self.clone()),
        }
    }

    /// Evaluates the expression against an optional row.
    pub fn reduce(
        &self,
        row: Option<&Row>,
        implicit_db: &str,
        implicit_table: &str,
    ) -> SqlResult<TypedValue> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Param(_) => Err(SqlError::Unexpected("unsubstituted parameter")),
            Self::Fn(SysFn::Now) => {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|_| SqlError::Unexpected("system clock before epoch"))?
                    .as_nanos() as i64;
                Ok(TypedValue::Integer(nanos))
            }
            Self::Col(sel) => {
                let row = row.ok_or(SqlError::InvalidValue)?;
                let (db, table) = sel.resolve(implicit_db, implicit_table);
                let key = encode_selector("", db, table, &sel.col);
                row.get(&key)
                    .cloned()
                    .ok_or(SqlError::ColumnDoesNotExist(sel.col.clone()))
            }
            Self::Agg(sel) => {
                let row = row.ok_or(SqlError::InvalidValue)?;
                let (db, table) = sel.resolve(implicit_db, implicit_table);
                let key = encode_selector(sel.agg_fn.as_str(), db, table, &sel.col);
                row.get(&key)
                    .cloned()
                    .ok_or(SqlError::ColumnDoesNotExist(sel.col.clone()))
            }
            Self::Num { op, left, right } => {
                let vl = left.reduce(row, implicit_db, implicit_table)?;
                let vr = right.reduce(row, implicit_db, implicit_table)?;

                let nl = vl.as_i64().ok_or(SqlError::InvalidValue)?;
                let nr = vr.as_i64().ok_or(SqlError::InvalidValue)?;

                match op {
                    NumOp::Add => Ok(TypedValue::Integer(nl.wrapping_add(nr))),
                    NumOp::Sub => Ok(TypedValue::Integer(nl.wrapping_sub(nr))),
                    NumOp::Mul => Ok(TypedValue::Integer(nl.wrapping_mul(nr))),
                    NumOp::Div => {
                        if nr == 0 {
                            Err(SqlError::DivisionByZero)
                        } else {
                            Ok(TypedValue::Integer(nl / nr))
                        }
                    }
                }
            }
            Self::Not(exp) => {
                let v = exp.reduce(row, implicit_db, implicit_table)?;
                let b = v.as_bool().ok_or(SqlError::InvalidCondition)?;
                Ok(TypedValue::Boolean(!b))
            }
            Self::Bin { op, left, right } => {
                let vl = left.reduce(row, implicit_db, implicit_table)?;
                let vr = right.reduce(row, implicit_db, implicit_table)?;

                let bl = vl.as_bool().ok_or(SqlError::InvalidValue)?;
                let br = vr.as_bool().ok_or(SqlError::InvalidValue)?;

                match op {
                    LogicOp::And => Ok(TypedValue::Boolean(bl && br)),
                    LogicOp::Or => Ok(TypedValue::Boolean(bl || br)),
                }
            }
            Self::Cmp { op, left, right } => {
                let vl = left.reduce(row, implicit_db, implicit_table)?;
                let vr = right.reduce(row, implicit_db, implicit_table)?;

                // A NULL operand makes the comparison false in filter
                // position; null ordering only applies to scans and sorts.
                if vl.is_null() || vr.is_null() {
                    return Ok(TypedValue::Boolean(false));
                }

                let ord = vl.compare(&vr)?;
                Ok(TypedValue::Boolean(cmp_satisfies_op(ord, *op)))
            }
            Self::Like { sel, pattern } => {
                let row = row.ok_or(SqlError::InvalidValue)?;
                let (db, table) = sel.resolve(implicit_db, implicit_table);
                let key = encode_selector("", db, table, &sel.col);
                let v = row
                    .get(&key)
                    .ok_or(SqlError::ColumnDoesNotExist(sel.col.clone()))?;

                match v {
                    TypedValue::Null(_) => Ok(TypedValue::Boolean(false)),
                    TypedValue::Varchar(s) => {
                        let re = regex::Regex::new(pattern)
                            .map_err(|_| SqlError::IllegalArguments("invalid LIKE pattern"))?;
                        Ok(TypedValue::Boolean(re.is_match(s)))
                    }
                    _ => Err(SqlError::InvalidColumn(sel.col.clone())),
                }
            }
            Self::Exists(_) => Err(SqlError::NoSupported),
        }
    }

    /// Replaces column selectors resolvable in `row` with their values.
    #[must_use]
    pub fn reduce_selectors(&self, row: &Row, implicit_db: &str, implicit_table: &str) -> Expr {
        match self {
            Self::Col(sel) => {
                let (db, table) = sel.resolve(implicit_db, implicit_table);
                let key = encode_selector("", db, table, &sel.col);
                match row.get(&key) {
                    Some(v) => Self::Literal(v.clone()),
                    None => self.clone(),
                }
            }
            Self::Num { op, left, right } => Self::Num {
                op: *op,
                left: Box::new(left.reduce_selectors(row, implicit_db, implicit_table)),
                right: Box::new(right.reduce_selectors(row, implicit_db, implicit_table)),
            },
            Self::Not(exp) => {
                Self::Not(Box::new(exp.reduce_selectors(row, implicit_db, implicit_table)))
            }
            Self::Bin { op, left, right } => Self::Bin {
                op: *op,
                left: Box::new(left.reduce_selectors(row, implicit_db, implicit_table)),
                right: Box::new(right.reduce_selectors(row, implicit_db, implicit_table)),
            },
            Self::Cmp { op, left, right } => Self::Cmp {
                op: *op,
                left: Box::new(left.reduce_selectors(row, implicit_db, implicit_table)),
                right: Box::new(right.reduce_selectors(row, implicit_db, implicit_table)),
            },
            _ => self.clone(),
        }
    }

    /// Returns true if the expression evaluates without a row.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Literal(_) | Self::Param(_) => true,
            Self::Fn(_) | Self::Col(_) | Self::Agg(_) | Self::Like { .. } | Self::Exists(_) => {
                false
            }
            Self::Num { left, right, .. }
            | Self::Bin { left, right, .. }
            | Self::Cmp { left, right, .. } => left.is_constant() && right.is_constant(),
            Self::Not(exp) => exp.is_constant(),
        }
    }

    /// Accumulates `col op const` predicates over `table` into per-column
    /// scan ranges.
    pub fn selector_ranges(
        &self,
        table: &Table,
        db_name: &str,
        as_table: &str,
        params: &Params,
        ranges: &mut HashMap<u32, ValueRange>,
    ) -> SqlResult<()> {
        match self {
            Self::Cmp { op, left, right } => {
                let (sel, constant, op) = match (left.as_ref(), right.as_ref()) {
                    (Self::Col(sel), c) if c.is_constant() => (sel, c, *op),
                    (c, Self::Col(sel)) if c.is_constant() => (sel, c, op.flipped()),
                    _ => return Ok(()),
                };

                let (db, tbl) = sel.resolve(db_name, as_table);
                if db != db_name || tbl != as_table {
                    return Ok(());
                }

                let column = table.col_by_name(&sel.col)?;

                let substituted = match constant.substitute(params) {
                    Ok(e) => e,
                    // Ranges cannot be derived for parameters that are not
                    // provided at resolution time.
                    Err(SqlError::MissingParameter(_)) => return Ok(()),
                    Err(e) => return Err(e),
                };
                let val = substituted.reduce(None, db_name, as_table)?;

                update_range_for(column.id, val, op, ranges)
            }
            Self::Bin {
                op: LogicOp::And,
                left,
                right,
            } => {
                left.selector_ranges(table, db_name, as_table, params, ranges)?;
                right.selector_ranges(table, db_name, as_table, params, ranges)
            }
            Self::Bin {
                op: LogicOp::Or,
                left,
                right,
            } => {
                let mut l_ranges = HashMap::new();
                let mut r_ranges = HashMap::new();

                left.selector_ranges(table, db_name, as_table, params, &mut l_ranges)?;
                right.selector_ranges(table, db_name, as_table, params, &mut r_ranges)?;

                // Only columns bounded on both sides stay bounded.
                for (col_id, mut lr) in l_ranges {
                    let Some(rr) = r_ranges.remove(&col_id) else {
                        continue;
                    };
                    lr.extend_with(&rr)?;
                    ranges.insert(col_id, lr);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Returns true if an ordering outcome satisfies a comparison operator.
#[must_use]
pub fn cmp_satisfies_op(ord: Ordering, op: CmpOp) -> bool {
    match ord {
        Ordering::Equal => matches!(op, CmpOp::Eq | CmpOp::Le | CmpOp::Ge),
        Ordering::Less => matches!(op, CmpOp::Ne | CmpOp::Lt | CmpOp::Le),
        Ordering::Greater => matches!(op, CmpOp::Ne | CmpOp::Gt | CmpOp::Ge),
    }
}

/// One bound of a value range.
#[derive(Debug, Clone, PartialEq)]
pub struct SemiRange {
    /// Bounding value.
    pub val: TypedValue,
    /// The bound itself is part of the range.
    pub inclusive: bool,
}

/// An inclusive/exclusive range of typed values over one column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRange {
    /// Lower bound; `None` is unbounded.
    pub low: Option<SemiRange>,
    /// Upper bound; `None` is unbounded.
    pub high: Option<SemiRange>,
}

impl ValueRange {
    fn point(val: TypedValue) -> Self {
        Self {
            low: Some(SemiRange {
                val: val.clone(),
                inclusive: true,
            }),
            high: Some(SemiRange {
                val,
                inclusive: true,
            }),
        }
    }

    /// Returns true if the range pins exactly one value.
    #[must_use]
    pub fn is_unitary(&self) -> bool {
        match (&self.low, &self.high) {
            (Some(l), Some(h)) => {
                l.inclusive
                    && h.inclusive
                    && l.val.compare(&h.val).map(Ordering::is_eq).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Intersects this range with another (`AND` semantics).
    pub fn refine_with(&mut self, other: &ValueRange) -> SqlResult<()> {
        self.low = match (self.low.take(), &other.low) {
            (None, l) => l.clone(),
            (l, None) => l,
            (Some(a), Some(b)) => Some(max_semi_range(&a, b)?),
        };

        self.high = match (self.high.take(), &other.high) {
            (None, h) => h.clone(),
            (h, None) => h,
            (Some(a), Some(b)) => Some(min_semi_range(&a, b)?),
        };

        Ok(())
    }

    /// Unions this range with another (`OR` semantics).
    pub fn extend_with(&mut self, other: &ValueRange) -> SqlResult<()> {
        self.low = match (self.low.take(), &other.low) {
            (None, _) | (_, None) => None,
            (Some(a), Some(b)) => Some(min_semi_range(&a, b)?),
        };

        self.high = match (self.high.take(), &other.high) {
            (None, _) | (_, None) => None,
            (Some(a), Some(b)) => Some(max_semi_range(&a, b)?),
        };

        Ok(())
    }

    /// Returns true if `val` lies within the range.
    pub fn contains(&self, val: &TypedValue) -> SqlResult<bool> {
        if let Some(l) = &self.low {
            let ord = val.compare(&l.val)?;
            if ord == Ordering::Less || (ord == Ordering::Equal && !l.inclusive) {
                return Ok(false);
            }
        }
        if let Some(h) = &self.high {
            let ord = val.compare(&h.val)?;
            if ord == Ordering::Greater || (ord == Ordering::Equal && !h.inclusive) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn max_semi_range(a: &SemiRange, b: &SemiRange) -> SqlResult<SemiRange> {
    let ord = a.val.compare(&b.val)?;
    let val = if ord == Ordering::Less {
        b.val.clone()
    } else {
        a.val.clone()
    };
    Ok(SemiRange {
        val,
        inclusive: a.inclusive && b.inclusive,
    })
}

fn min_semi_range(a: &SemiRange, b: &SemiRange) -> SqlResult<SemiRange> {
    let ord = a.val.compare(&b.val)?;
    let val = if ord == Ordering::Greater {
        b.val.clone()
    } else {
        a.val.clone()
    };
    Ok(SemiRange {
        val,
        inclusive: a.inclusive || b.inclusive,
    })
}

fn update_range_for(
    col_id: u32,
    val: TypedValue,
    op: CmpOp,
    ranges: &mut HashMap<u32, ValueRange>,
) -> SqlResult<()> {
    let new_range = match op {
        CmpOp::Eq => ValueRange::point(val),
        CmpOp::Lt => ValueRange {
            low: None,
            high: Some(SemiRange {
                val,
                inclusive: false,
            }),
        },
        CmpOp::Le => ValueRange {
            low: None,
            high: Some(SemiRange {
                val,
                inclusive: true,
            }),
        },
        CmpOp::Gt => ValueRange {
            low: Some(SemiRange {
                val,
                inclusive: false,
            }),
            high: None,
        },
        CmpOp::Ge => ValueRange {
            low: Some(SemiRange {
                val,
                inclusive: true,
            }),
            high: None,
        },
        CmpOp::Ne => return Ok(()),
    };

    match ranges.get_mut(&col_id) {
        Some(curr) => curr.refine_with(&new_range),
        None => {
            ranges.insert(col_id, new_range);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ColSpec;
    use crate::catalog::Catalog;
    use crate::row::{cols_by_name, ColDescriptor};

    fn test_cols() -> ColsByName {
        cols_by_name(&[
            ColDescriptor::new("db1", "t1", "id", SqlType::Integer),
            ColDescriptor::new("db1", "t1", "name", SqlType::Varchar),
            ColDescriptor::new("db1", "t1", "active", SqlType::Boolean),
        ])
    }

    fn test_table() -> Table {
        let mut catalog = Catalog::new();
        catalog.new_database("db1").unwrap();
        let db = catalog.db_by_name_mut("db1").unwrap();
        let specs = vec![
            ColSpec::new("id", SqlType::Integer),
            ColSpec::new("age", SqlType::Integer),
        ];
        let table = db.new_table("t1", &specs).unwrap();
        table.new_index(true, vec![1]).unwrap();
        table.clone()
    }

    fn age_cmp(op: CmpOp, v: i64) -> Expr {
        Expr::col_cmp("age", op, v)
    }

    #[test]
    fn test_infer_literal_and_param() {
        let cols = test_cols();
        let mut params = ParamTypes::new();

        let e = Expr::Literal(TypedValue::Integer(1));
        assert_eq!(
            e.infer_type(&cols, &mut params, "db1", "t1").unwrap(),
            SqlType::Integer
        );

        let p = Expr::Param("x".to_string());
        assert_eq!(
            p.infer_type(&cols, &mut params, "db1", "t1").unwrap(),
            SqlType::Any
        );
        assert_eq!(params["x"], SqlType::Any);
    }

    #[test]
    fn test_param_narrowing_conflict() {
        let cols = test_cols();
        let mut params = ParamTypes::new();
        let p = Expr::Param("x".to_string());

        p.requires_type(SqlType::Integer, &cols, &mut params, "db1", "t1")
            .unwrap();
        assert_eq!(params["x"], SqlType::Integer);

        let err = p.requires_type(SqlType::Varchar, &cols, &mut params, "db1", "t1");
        assert!(matches!(err, Err(SqlError::InferredMultipleTypes(_))));
    }

    #[test]
    fn test_cmp_unifies_param_with_column() {
        let cols = test_cols();
        let mut params = ParamTypes::new();

        let e = Expr::cmp(
            Expr::Col(ColSelector::new("name")),
            CmpOp::Eq,
            Expr::Param("n".to_string()),
        );
        assert_eq!(
            e.infer_type(&cols, &mut params, "db1", "t1").unwrap(),
            SqlType::Boolean
        );
        assert_eq!(params["n"], SqlType::Varchar);
    }

    #[test]
    fn test_substitute() {
        let mut params = Params::new();
        params.insert("x".to_string(), TypedValue::Integer(5));

        let e = Expr::cmp(
            Expr::Col(ColSelector::new("id")),
            CmpOp::Gt,
            Expr::Param("x".to_string()),
        );
        let s = e.substitute(&params).unwrap();
        match s {
            Expr::Cmp { right, .. } => {
                assert!(matches!(*right, Expr::Literal(TypedValue::Integer(5))));
            }
            _ => panic!("shape changed"),
        }

        let missing = Expr::Param("y".to_string()).substitute(&params);
        assert!(matches!(missing, Err(SqlError::MissingParameter(_))));
    }

    #[test]
    fn test_reduce_arithmetic_and_division_by_zero() {
        let lit = |v: i64| Expr::Literal(TypedValue::Integer(v));

        let e = Expr::Num {
            op: NumOp::Div,
            left: Box::new(lit(10)),
            right: Box::new(lit(3)),
        };
        assert_eq!(
            e.reduce(None, "db1", "t1").unwrap(),
            TypedValue::Integer(3)
        );

        let e = Expr::Num {
            op: NumOp::Div,
            left: Box::new(lit(1)),
            right: Box::new(lit(0)),
        };
        assert!(matches!(
            e.reduce(None, "db1", "t1"),
            Err(SqlError::DivisionByZero)
        ));
    }

    #[test]
    fn test_reduce_null_comparison_is_false() {
        let null = Expr::Literal(TypedValue::Null(SqlType::Any));
        let one = Expr::Literal(TypedValue::Integer(1));

        for op in [CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Ge] {
            let e = Expr::cmp(null.clone(), op, one.clone());
            assert_eq!(
                e.reduce(None, "db1", "t1").unwrap(),
                TypedValue::Boolean(false)
            );
        }

        let e = Expr::cmp(null.clone(), CmpOp::Eq, null);
        assert_eq!(
            e.reduce(None, "db1", "t1").unwrap(),
            TypedValue::Boolean(false)
        );
    }

    #[test]
    fn test_reduce_col_from_row() {
        let mut row = Row::new();
        row.insert("(db1.t1.id)", TypedValue::Integer(9));

        let e = Expr::Col(ColSelector::new("id"));
        assert_eq!(
            e.reduce(Some(&row), "db1", "t1").unwrap(),
            TypedValue::Integer(9)
        );

        let e = Expr::Col(ColSelector::new("missing"));
        assert!(matches!(
            e.reduce(Some(&row), "db1", "t1"),
            Err(SqlError::ColumnDoesNotExist(_))
        ));
    }

    #[test]
    fn test_reduce_selectors_injects_values() {
        let mut row = Row::new();
        row.insert("(db1.t1.id)", TypedValue::Integer(4));

        let e = Expr::cmp(
            Expr::Col(ColSelector::new("id")),
            CmpOp::Eq,
            Expr::Col(ColSelector::new("other").with_table("t2")),
        );
        let reduced = e.reduce_selectors(&row, "db1", "t1");
        match reduced {
            Expr::Cmp { left, right, .. } => {
                assert!(matches!(*left, Expr::Literal(TypedValue::Integer(4))));
                assert!(matches!(*right, Expr::Col(_)));
            }
            _ => panic!("shape changed"),
        }
    }

    #[test]
    fn test_like_matches_regex() {
        let mut row = Row::new();
        row.insert("(db1.t1.name)", TypedValue::Varchar("alice".into()));

        let e = Expr::Like {
            sel: ColSelector::new("name"),
            pattern: "^ali".to_string(),
        };
        assert_eq!(
            e.reduce(Some(&row), "db1", "t1").unwrap(),
            TypedValue::Boolean(true)
        );

        let e = Expr::Like {
            sel: ColSelector::new("name"),
            pattern: "^bob".to_string(),
        };
        assert_eq!(
            e.reduce(Some(&row), "db1", "t1").unwrap(),
            TypedValue::Boolean(false)
        );
    }

    #[test]
    fn test_selector_ranges_and() {
        let table = test_table();
        let mut ranges = HashMap::new();

        // age >= 20 AND age < 40
        let e = Expr::and(age_cmp(CmpOp::Ge, 20), age_cmp(CmpOp::Lt, 40));
        e.selector_ranges(&table, "db1", "t1", &Params::new(), &mut ranges)
            .unwrap();

        let r = &ranges[&2];
        assert_eq!(
            r.low,
            Some(SemiRange {
                val: TypedValue::Integer(20),
                inclusive: true
            })
        );
        assert_eq!(
            r.high,
            Some(SemiRange {
                val: TypedValue::Integer(40),
                inclusive: false
            })
        );

        assert!(r.contains(&TypedValue::Integer(20)).unwrap());
        assert!(r.contains(&TypedValue::Integer(39)).unwrap());
        assert!(!r.contains(&TypedValue::Integer(40)).unwrap());
        assert!(!r.contains(&TypedValue::Integer(19)).unwrap());
    }

    #[test]
    fn test_selector_ranges_or_union() {
        let table = test_table();
        let mut ranges = HashMap::new();

        // age < 10 OR age > 90
        let e = Expr::or(age_cmp(CmpOp::Lt, 10), age_cmp(CmpOp::Gt, 90));
        e.selector_ranges(&table, "db1", "t1", &Params::new(), &mut ranges)
            .unwrap();

        // The per-column union is unbounded on both sides.
        let r = &ranges[&2];
        assert!(r.low.is_none());
        assert!(r.high.is_none());
    }

    #[test]
    fn test_selector_ranges_or_drops_one_sided_columns() {
        let table = test_table();
        let mut ranges = HashMap::new();

        // age > 5 OR id = 3: neither column is bounded on both branches.
        let e = Expr::or(age_cmp(CmpOp::Gt, 5), Expr::col_cmp("id", CmpOp::Eq, 3_i64));
        e.selector_ranges(&table, "db1", "t1", &Params::new(), &mut ranges)
            .unwrap();
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_selector_ranges_flipped_operand_order() {
        let table = test_table();
        let mut ranges = HashMap::new();

        // 20 <= age, written constant-first.
        let e = Expr::cmp(
            Expr::Literal(TypedValue::Integer(20)),
            CmpOp::Le,
            Expr::Col(ColSelector::new("age")),
        );
        e.selector_ranges(&table, "db1", "t1", &Params::new(), &mut ranges)
            .unwrap();

        let r = &ranges[&2];
        assert_eq!(
            r.low,
            Some(SemiRange {
                val: TypedValue::Integer(20),
                inclusive: true
            })
        );
        assert!(r.high.is_none());
    }

    #[test]
    fn test_selector_ranges_ne_contributes_nothing() {
        let table = test_table();
        let mut ranges = HashMap::new();

        age_cmp(CmpOp::Ne, 7)
            .selector_ranges(&table, "db1", "t1", &Params::new(), &mut ranges)
            .unwrap();
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_unitary_range() {
        let mut ranges = HashMap::new();
        update_range_for(1, TypedValue::Integer(5), CmpOp::Eq, &mut ranges).unwrap();
        assert!(ranges[&1].is_unitary());

        update_range_for(1, TypedValue::Integer(5), CmpOp::Ge, &mut ranges).unwrap();
        assert!(ranges[&1].is_unitary());

        let mut ranges = HashMap::new();
        update_range_for(1, TypedValue::Integer(5), CmpOp::Ge, &mut ranges).unwrap();
        assert!(!ranges[&1].is_unitary());
    }
}
