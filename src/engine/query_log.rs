use std::fmt;
use std::time::Duration;

use crate::sql::SqlValue;

/// One statement the engine sent to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogEntry {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub elapsed: Duration,
}

impl fmt::Display for QueryLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.sql)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, "] ({:?})", self.elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let entry = QueryLogEntry {
            sql: "SELECT 1 WHERE ? = ?".into(),
            params: vec![SqlValue::Integer(1), SqlValue::Text("a".into())],
            elapsed: Duration::from_millis(2),
        };
        assert_eq!(entry.to_string(), "SELECT 1 WHERE ? = ? [1, 'a'] (2ms)");
    }
}
