use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("insufficient data for a forecast: {found} graded submissions, at least 3 required")]
    InsufficientData { found: usize },
    #[error("no students enrolled in the class")]
    NoStudents,
    #[error("no feedback text recorded for the class")]
    NoFeedback,
    #[error("no graded submissions for the student in the class")]
    NoData,
    #[error("record store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl AnalyticsError {
    /// True for the "nothing to analyze" outcomes a caller renders as an
    /// empty state. Only store failures are unexpected.
    pub fn is_expected(&self) -> bool {
        !matches!(self, AnalyticsError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_errors_are_unexpected() {
        assert!(AnalyticsError::InsufficientData { found: 2 }.is_expected());
        assert!(AnalyticsError::NoStudents.is_expected());
        assert!(AnalyticsError::NoFeedback.is_expected());
        assert!(AnalyticsError::NoData.is_expected());
        assert!(!AnalyticsError::Store(sqlx::Error::RowNotFound).is_expected());
    }

    #[test]
    fn store_errors_keep_their_message() {
        let err = AnalyticsError::from(sqlx::Error::Protocol("connection reset".to_string()));
        assert!(err.to_string().contains("connection reset"));
    }
}
