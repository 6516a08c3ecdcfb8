//! Fixed vendor enumerations.

/// Entity category codes used by notes, tasks, and field administration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Contact = 1,
    Lead = 2,
    Company = 3,
    Task = 4,
    Customer = 12,
}

impl ElementType {
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Lowercase name used in query strings.
    pub const fn as_param(self) -> &'static str {
        match self {
            ElementType::Contact => "contact",
            ElementType::Lead => "lead",
            ElementType::Company => "company",
            ElementType::Task => "task",
            ElementType::Customer => "customer",
        }
    }
}

/// Pipelines may add custom statuses, but these two always exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadStatus {
    Success = 142,
    Fail = 143,
}

impl LeadStatus {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// Lead list filter on attached tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadTasksFilter {
    Empty = 1,
    Uncompleted = 2,
}

impl LeadTasksFilter {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Call = 1,
    Meeting = 2,
    Letter = 3,
}

impl TaskType {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteType {
    DealCreated = 1,
    ContactCreated = 2,
    DealStatusChanged = 3,
    Common = 4,
    CallIn = 10,
    CallOut = 11,
    CompanyCreated = 12,
    TaskResult = 13,
    System = 25,
    SmsIn = 102,
    SmsOut = 103,
}

impl NoteType {
    pub const fn code(self) -> i64 {
        self as i64
    }
}
