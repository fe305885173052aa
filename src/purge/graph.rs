//! Static deletion graph for the legacy user purge.
//!
//! Every table that can reference a legacy user, directly or through a
//! student or enrollment the user owns, is listed here in deletion order.
//! Dependents come before the rows they reference; the `users` row itself is
//! not part of the list and is always deleted last by the orchestrator.
//!
//! When the schema grows a new relation to `users`, `students` or
//! `enrollments`, add it here. `validate_graph` checks the ordering rules and
//! runs in the unit tests.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A table that can be purged by matching one column against a set of ids
pub trait DeletableByColumn {
    fn table(&self) -> &'static str;
    fn match_column(&self) -> &'static str;
}

/// Tables with a compile-time bound delete statement.
///
/// Each statement takes a single `bigint[]` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableBinding {
    Users,
    Students,
    Enrollments,
    EnrollmentCourses,
    Certificates,
    Payments,
    AttendanceRecords,
    Grades,
    StudentDocuments,
    Sessions,
    PasswordResets,
    Notifications,
    UserRoles,
}

impl TableBinding {
    pub const fn delete_statement(self) -> &'static str {
        match self {
            TableBinding::Users => "DELETE FROM users WHERE id = ANY($1)",
            TableBinding::Students => "DELETE FROM students WHERE id = ANY($1)",
            TableBinding::Enrollments => "DELETE FROM enrollments WHERE id = ANY($1)",
            TableBinding::EnrollmentCourses => {
                "DELETE FROM enrollment_courses WHERE enrollment_id = ANY($1)"
            }
            TableBinding::Certificates => "DELETE FROM certificates WHERE enrollment_id = ANY($1)",
            TableBinding::Payments => "DELETE FROM payments WHERE student_id = ANY($1)",
            TableBinding::AttendanceRecords => {
                "DELETE FROM attendance_records WHERE student_id = ANY($1)"
            }
            TableBinding::Grades => "DELETE FROM grades WHERE student_id = ANY($1)",
            TableBinding::StudentDocuments => {
                "DELETE FROM student_documents WHERE student_id = ANY($1)"
            }
            TableBinding::Sessions => "DELETE FROM sessions WHERE user_id = ANY($1)",
            TableBinding::PasswordResets => "DELETE FROM password_resets WHERE user_id = ANY($1)",
            TableBinding::Notifications => "DELETE FROM notifications WHERE user_id = ANY($1)",
            TableBinding::UserRoles => "DELETE FROM user_roles WHERE user_id = ANY($1)",
        }
    }
}

impl DeletableByColumn for TableBinding {
    fn table(&self) -> &'static str {
        match self {
            TableBinding::Users => "users",
            TableBinding::Students => "students",
            TableBinding::Enrollments => "enrollments",
            TableBinding::EnrollmentCourses => "enrollment_courses",
            TableBinding::Certificates => "certificates",
            TableBinding::Payments => "payments",
            TableBinding::AttendanceRecords => "attendance_records",
            TableBinding::Grades => "grades",
            TableBinding::StudentDocuments => "student_documents",
            TableBinding::Sessions => "sessions",
            TableBinding::PasswordResets => "password_resets",
            TableBinding::Notifications => "notifications",
            TableBinding::UserRoles => "user_roles",
        }
    }

    fn match_column(&self) -> &'static str {
        match self {
            TableBinding::Users | TableBinding::Students | TableBinding::Enrollments => "id",
            TableBinding::EnrollmentCourses | TableBinding::Certificates => "enrollment_id",
            TableBinding::Payments
            | TableBinding::AttendanceRecords
            | TableBinding::Grades
            | TableBinding::StudentDocuments => "student_id",
            TableBinding::Sessions
            | TableBinding::PasswordResets
            | TableBinding::Notifications
            | TableBinding::UserRoles => "user_id",
        }
    }
}

/// Legacy table without a bound statement; deleted one value at a time
/// with a parameterized raw statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStatement {
    pub table: &'static str,
    pub match_column: &'static str,
}

impl DeletableByColumn for RawStatement {
    fn table(&self) -> &'static str {
        self.table
    }

    fn match_column(&self) -> &'static str {
        self.match_column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Structured(TableBinding),
    Raw(RawStatement),
}

impl DeletableByColumn for Access {
    fn table(&self) -> &'static str {
        match self {
            Access::Structured(binding) => binding.table(),
            Access::Raw(statement) => statement.table(),
        }
    }

    fn match_column(&self) -> &'static str {
        match self {
            Access::Structured(binding) => binding.match_column(),
            Access::Raw(statement) => statement.match_column(),
        }
    }
}

/// Entities a legacy user owns; their ids are resolved before the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnedKind {
    Student,
    Enrollment,
}

/// How a row of an owned kind is tied back to the legacy user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipLink {
    /// `column` holds the user id
    User { column: &'static str },
    /// `column` holds the id of another owned entity
    Through { column: &'static str, parent: OwnedKind },
}

impl OwnedKind {
    /// Parents before children
    pub const RESOLUTION_ORDER: [OwnedKind; 2] = [OwnedKind::Student, OwnedKind::Enrollment];

    pub const fn binding(self) -> TableBinding {
        match self {
            OwnedKind::Student => TableBinding::Students,
            OwnedKind::Enrollment => TableBinding::Enrollments,
        }
    }

    pub fn table(self) -> &'static str {
        self.binding().table()
    }

    pub const fn links(self) -> &'static [OwnershipLink] {
        match self {
            OwnedKind::Student => &[OwnershipLink::User { column: "user_id" }],
            OwnedKind::Enrollment => &[
                OwnershipLink::User { column: "user_id" },
                OwnershipLink::Through { column: "student_id", parent: OwnedKind::Student },
            ],
        }
    }
}

impl fmt::Display for OwnedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnedKind::Student => write!(f, "student"),
            OwnedKind::Enrollment => write!(f, "enrollment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// Match column holds the legacy user id
    Direct,
    /// Match column holds ids of an owned entity
    Via(OwnedKind),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Direct => write!(f, "direct"),
            Reference::Via(kind) => write!(f, "via_{}", kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEntry {
    pub access: Access,
    pub reference: Reference,
}

impl GraphEntry {
    pub const fn structured(binding: TableBinding, reference: Reference) -> Self {
        Self {
            access: Access::Structured(binding),
            reference,
        }
    }

    pub const fn raw(table: &'static str, match_column: &'static str, reference: Reference) -> Self {
        Self {
            access: Access::Raw(RawStatement { table, match_column }),
            reference,
        }
    }
}

impl DeletableByColumn for GraphEntry {
    fn table(&self) -> &'static str {
        self.access.table()
    }

    fn match_column(&self) -> &'static str {
        self.access.match_column()
    }
}

/// The root row, deleted after every graph entry
pub const ROOT: TableBinding = TableBinding::Users;

const VIA_ENROLLMENT: Reference = Reference::Via(OwnedKind::Enrollment);
const VIA_STUDENT: Reference = Reference::Via(OwnedKind::Student);

pub static DELETION_GRAPH: [GraphEntry; 16] = [
    // Enrollment dependents
    GraphEntry::structured(TableBinding::EnrollmentCourses, VIA_ENROLLMENT),
    GraphEntry::raw("enrollment_fees", "enrollment_id", VIA_ENROLLMENT),
    GraphEntry::structured(TableBinding::Certificates, VIA_ENROLLMENT),
    // Student dependents
    GraphEntry::structured(TableBinding::Payments, VIA_STUDENT),
    GraphEntry::structured(TableBinding::AttendanceRecords, VIA_STUDENT),
    GraphEntry::structured(TableBinding::Grades, VIA_STUDENT),
    GraphEntry::structured(TableBinding::StudentDocuments, VIA_STUDENT),
    GraphEntry::raw("guardians", "student_id", VIA_STUDENT),
    // Owned entities; enrollments reference students
    GraphEntry::structured(TableBinding::Enrollments, VIA_ENROLLMENT),
    GraphEntry::structured(TableBinding::Students, VIA_STUDENT),
    // Direct user references
    GraphEntry::structured(TableBinding::Sessions, Reference::Direct),
    GraphEntry::structured(TableBinding::PasswordResets, Reference::Direct),
    GraphEntry::structured(TableBinding::Notifications, Reference::Direct),
    GraphEntry::structured(TableBinding::UserRoles, Reference::Direct),
    GraphEntry::raw("audit_logs", "user_id", Reference::Direct),
    GraphEntry::raw("login_history", "user_id", Reference::Direct),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("table '{0}' appears more than once")]
    DuplicateTable(&'static str),

    #[error("root table '{0}' must not be listed; it is always deleted last")]
    RootListed(&'static str),

    #[error("no entry deletes owned table '{0}'")]
    MissingOwnedTable(&'static str),

    #[error("owned table '{table}' must match on 'id' via its own kind")]
    OwnedTableMismatch { table: &'static str },

    #[error("'{dependent}' is deleted after '{dependency}', which it references")]
    OutOfOrder {
        dependent: &'static str,
        dependency: &'static str,
    },
}

/// Check the ordering rules of a deletion graph
pub fn validate_graph(graph: &[GraphEntry]) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for entry in graph {
        if entry.table() == ROOT.table() {
            return Err(GraphError::RootListed(ROOT.table()));
        }
        if !seen.insert(entry.table()) {
            return Err(GraphError::DuplicateTable(entry.table()));
        }
    }

    let position = |table: &str| graph.iter().position(|entry| entry.table() == table);

    for kind in OwnedKind::RESOLUTION_ORDER {
        let owned_at = position(kind.table()).ok_or(GraphError::MissingOwnedTable(kind.table()))?;
        let owned = &graph[owned_at];
        if owned.reference != Reference::Via(kind) || owned.match_column() != "id" {
            return Err(GraphError::OwnedTableMismatch { table: kind.table() });
        }

        // Everything that references this kind goes first
        for (index, entry) in graph.iter().enumerate() {
            if index > owned_at && entry.reference == Reference::Via(kind) {
                return Err(GraphError::OutOfOrder {
                    dependent: entry.table(),
                    dependency: kind.table(),
                });
            }
        }

        // An owned kind held through a parent is deleted before the parent
        for link in kind.links() {
            if let OwnershipLink::Through { parent, .. } = link {
                let parent_at =
                    position(parent.table()).ok_or(GraphError::MissingOwnedTable(parent.table()))?;
                if parent_at < owned_at {
                    return Err(GraphError::OutOfOrder {
                        dependent: kind.table(),
                        dependency: parent.table(),
                    });
                }
            }
        }
    }

    Ok(())
}

/// One row of the printable deletion plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub position: usize,
    pub table: &'static str,
    pub match_column: &'static str,
    pub reference: String,
    pub access: &'static str,
}

/// Ordered plan for a graph, root row included as the final step
pub fn plan(graph: &[GraphEntry]) -> Vec<PlanStep> {
    let mut steps: Vec<PlanStep> = graph
        .iter()
        .enumerate()
        .map(|(index, entry)| PlanStep {
            position: index + 1,
            table: entry.table(),
            match_column: entry.match_column(),
            reference: entry.reference.to_string(),
            access: match entry.access {
                Access::Structured(_) => "structured",
                Access::Raw(_) => "raw",
            },
        })
        .collect();

    steps.push(PlanStep {
        position: graph.len() + 1,
        table: ROOT.table(),
        match_column: ROOT.match_column(),
        reference: "root".to_string(),
        access: "structured",
    });
    steps
}
