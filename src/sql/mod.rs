pub mod builder;
pub mod dialect;
pub mod params;

pub use builder::{
    delete, insert, select_by_id, select_by_ids, select_grouped, select_list, update, Aggregate, Predicate,
    Projection, QueryBuf, TableRef,
};
pub use dialect::{like_pattern, quoted, SqlDialect};
pub use params::{bind_all, BindValue};
