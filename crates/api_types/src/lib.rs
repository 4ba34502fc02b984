use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod group {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupNew {
        pub name: String,
    }

    /// A group with its aggregates. Amounts are integer minor units.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupView {
        pub id: Uuid,
        pub name: String,
        pub total_expense_minor: i64,
        pub average_expense_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupsResponse {
        pub groups: Vec<GroupView>,
    }
}

pub mod member {
    use super::*;

    /// Role of a user in a group.
    ///
    /// - `manager`: approves expenses and manages members.
    /// - `member`: logs their own spend, which starts pending.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum MemberRole {
        Member,
        Manager,
    }

    impl MemberRole {
        /// Returns the canonical role string used by the engine/database.
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Member => "member",
                Self::Manager => "manager",
            }
        }
    }

    /// Request body for adding a member. New members always get the
    /// `member` role.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct MemberAdd {
        pub username: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MemberView {
        pub username: String,
        pub role: MemberRole,
        pub total_expense_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MembersResponse {
        pub members: Vec<MemberView>,
    }
}

pub mod expense {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ExpenseStatus {
        Pending,
        Approved,
        Denied,
    }

    /// Request body for logging an expense.
    ///
    /// `status` is accepted for wire compatibility but ignored: the server
    /// decides the initial status from the actor's role.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpenseNew {
        /// The member whose spend this counts toward; defaults to the
        /// authenticated user.
        pub member: Option<String>,
        pub title: String,
        pub note: Option<String>,
        pub amount_minor: i64,
        pub status: Option<ExpenseStatus>,
        pub occurred_at: Option<DateTime<FixedOffset>>,
    }

    /// Request body for editing an expense. Absent fields are untouched.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ExpenseUpdate {
        pub title: Option<String>,
        /// `Some(None)` clears the note.
        #[serde(default, with = "double_option")]
        pub note: Option<Option<String>>,
        pub amount_minor: Option<i64>,
        pub status: Option<ExpenseStatus>,
        pub occurred_at: Option<DateTime<FixedOffset>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpenseView {
        pub id: Uuid,
        pub group_id: Uuid,
        pub member: String,
        pub title: String,
        pub note: Option<String>,
        pub amount_minor: i64,
        pub status: ExpenseStatus,
        pub occurred_at: DateTime<FixedOffset>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpenseCreated {
        pub id: Uuid,
        pub status: ExpenseStatus,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpensesResponse {
        pub expenses: Vec<ExpenseView>,
    }

    /// Serde helper distinguishing an absent field from an explicit null.
    mod double_option {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            T: Serialize,
            S: Serializer,
        {
            match value {
                Some(inner) => inner.serialize(serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
        where
            T: Deserialize<'de>,
            D: Deserializer<'de>,
        {
            Option::<T>::deserialize(deserializer).map(Some)
        }
    }
}
