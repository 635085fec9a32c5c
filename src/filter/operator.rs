//! # Operator-Compatibility Matrix
//!
//! The single table of which query operators may be applied to which
//! declared field types. Filter validation consults it for every
//! predicate; nothing else keeps a copy.

use std::fmt;

use crate::schema::FieldType;

use FieldType::{
    Array, Boolean, Date, Number, NumberArray, Object, ObjectId, ObjectIdArray, String,
    StringArray,
};

/// Query operators accepted inside field predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    In,
    Nin,
    Regex,
    Exists,
    RegexMatch,
    Search,
    All,
    ElemMatch,
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Eq,
        Operator::Ne,
        Operator::In,
        Operator::Nin,
        Operator::Regex,
        Operator::Exists,
        Operator::RegexMatch,
        Operator::Search,
        Operator::All,
        Operator::ElemMatch,
    ];

    /// Wire key of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Regex => "$regex",
            Operator::Exists => "$exists",
            Operator::RegexMatch => "$regexMatch",
            Operator::Search => "$search",
            Operator::All => "$all",
            Operator::ElemMatch => "$elemMatch",
        }
    }

    /// Looks up an operator by wire key
    pub fn parse(key: &str) -> Option<Self> {
        Operator::ALL.into_iter().find(|op| op.as_str() == key)
    }

    /// Declared types this operator may be applied to
    pub fn allowed_types(&self) -> &'static [FieldType] {
        match self {
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => &[Number, Date],
            Operator::Eq => &[String, ObjectId, Number, Boolean, Date],
            Operator::Ne => &[Object, String, ObjectId, Number, Boolean, Date],
            Operator::In | Operator::Nin => &[
                String,
                ObjectId,
                Number,
                Boolean,
                StringArray,
                ObjectIdArray,
                NumberArray,
            ],
            Operator::Regex => &[String],
            Operator::Exists => &[
                Object,
                String,
                ObjectId,
                Number,
                Boolean,
                Date,
                StringArray,
                ObjectIdArray,
                NumberArray,
            ],
            Operator::RegexMatch | Operator::Search => &[Object],
            Operator::All => &[
                Number,
                String,
                ObjectId,
                Boolean,
                NumberArray,
                StringArray,
                ObjectIdArray,
            ],
            Operator::ElemMatch => &[
                Object,
                String,
                ObjectId,
                Number,
                Boolean,
                Date,
                StringArray,
                ObjectIdArray,
                NumberArray,
                Array,
            ],
        }
    }

    pub fn accepts(&self, field_type: FieldType) -> bool {
        self.allowed_types().contains(&field_type)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
