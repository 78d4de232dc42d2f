//! Business status codes carried in every response

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Status code of a response, serialized as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StatusCode {
    SuccessQuery = 0,
    FailQuery = 1,
    SuccessModify = 2,
    FailModifyExist = 3,
    ParameterError = 4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_serialize_as_integers() {
        let codes = [
            StatusCode::SuccessQuery,
            StatusCode::FailQuery,
            StatusCode::SuccessModify,
            StatusCode::FailModifyExist,
            StatusCode::ParameterError,
        ];

        let json = serde_json::to_string(&codes).unwrap();

        assert_eq!(json, "[0,1,2,3,4]");
        let back: StatusCode = serde_json::from_str("3").unwrap();
        assert_eq!(back, StatusCode::FailModifyExist);
    }
}
