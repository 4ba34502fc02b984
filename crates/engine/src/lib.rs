pub use error::EngineError;
pub use expenses::{Expense, ExpenseStatus, ExpenseUpdate};
pub use groups::Group;
pub use members::{Member, MemberRole};
pub use ops::{Engine, EngineBuilder};

pub mod expenses;
pub mod groups;
pub mod members;
pub mod users;

mod error;
mod ops;

type ResultEngine<T> = Result<T, EngineError>;
