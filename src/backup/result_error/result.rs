use crate::backup::result_error::error::Error;
use crate::backup::result_error::WithMsg;

pub type Result<T> = std::result::Result<T, Error>;

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

pub fn convert_error_vec(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_vec_empty_is_ok() {
        assert!(convert_error_vec(vec![]).is_ok());
    }

    #[test]
    fn test_convert_error_vec_keeps_every_error() {
        let errors = vec![
            Error::Config("first".into()),
            Error::Config("second".into()),
        ];
        match convert_error_vec(errors) {
            Err(Error::LotsOfError(v)) => assert_eq!(v.len(), 2),
            other => panic!("Expected LotsOfError, got {other:?}"),
        }
    }

    #[test]
    fn test_result_with_msg() {
        let res: Result<()> = Err(Error::Config("inner".into()));
        let err = res.with_msg("outer").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("outer:"));
        assert!(text.contains("inner"));
    }
}
