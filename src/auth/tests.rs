use super::*;
use axum::http::HeaderMap;

fn with_authorization(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.parse().unwrap());
    headers
}

#[cfg(test)]
mod extract_bearer_token_tests {
    use super::*;

    #[test]
    fn session_token_from_frontend() {
        let headers = with_authorization("Bearer tok-alice");
        assert_eq!(extract_bearer_token(&headers), Ok("tok-alice".to_string()));
    }

    #[test]
    fn scheme_is_case_insensitive_and_token_trimmed() {
        for value in ["bearer tok-alice", "BEARER tok-alice", "Bearer   tok-alice  "] {
            assert_eq!(
                extract_bearer_token(&with_authorization(value)),
                Ok("tok-alice".to_string()),
                "header {:?}",
                value
            );
        }
    }

    #[test]
    fn rejected_header_shapes() {
        let cases = [
            ("", TokenError::InvalidFormat),
            ("tok-alice", TokenError::InvalidFormat),
            ("Basic YWxpY2U6c2VjcmV0", TokenError::InvalidFormat),
            ("Bearer", TokenError::InvalidFormat),
            ("Bearer  ", TokenError::Empty),
        ];

        for (value, expected) in cases {
            assert_eq!(
                extract_bearer_token(&with_authorization(value)),
                Err(expected),
                "header {:?}",
                value
            );
        }
    }

    #[test]
    fn callback_requests_carry_no_header() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), Err(TokenError::Missing));
    }
}

#[cfg(test)]
mod session_registry_tests {
    use super::*;

    fn registry() -> SessionRegistry {
        let registry = SessionRegistry::new();
        registry.insert("tok-alice", User::new("alice").with_organization("org-1"));
        registry.insert("tok-bob", User::new("bob"));
        registry
    }

    #[test]
    fn configured_sessions_resolve_users() {
        let registry = registry();
        assert_eq!(registry.count(), 2);

        let alice = registry
            .authenticate(&with_authorization("Bearer tok-alice"))
            .unwrap();
        assert_eq!(alice, User::new("alice").with_organization("org-1"));

        let bob = registry
            .authenticate(&with_authorization("Bearer tok-bob"))
            .unwrap();
        assert!(bob.organization_id.is_none());
    }

    #[test]
    fn unknown_token_rejected() {
        let result = registry().authenticate(&with_authorization("Bearer tok-mallory"));
        assert_eq!(result, Err(AuthError::UnknownSession));
    }

    #[test]
    fn malformed_header_rejected_before_lookup() {
        let registry = registry();

        assert_eq!(
            registry.authenticate(&HeaderMap::new()),
            Err(AuthError::InvalidToken(TokenError::Missing))
        );
        // A known token without the scheme is still rejected
        assert_eq!(
            registry.authenticate(&with_authorization("tok-alice")),
            Err(AuthError::InvalidToken(TokenError::InvalidFormat))
        );
    }

    #[test]
    fn session_config_entries_deserialize() {
        let user: User = serde_json::from_str(r#"{"id": "carol", "organization_id": "org-2"}"#).unwrap();
        assert_eq!(user.organization_role().unwrap().organization_id, "org-2");

        let user: User = serde_json::from_str(r#"{"id": "dave"}"#).unwrap();
        assert!(user.organization_role().is_none());
    }
}

#[cfg(test)]
mod error_display_tests {
    use super::*;

    #[test]
    fn auth_errors_name_the_cause() {
        assert_eq!(
            AuthError::InvalidToken(TokenError::Missing).to_string(),
            "Invalid token: Authorization token not provided"
        );
        assert_eq!(
            AuthError::InvalidToken(TokenError::Empty).to_string(),
            "Invalid token: Authorization token is empty"
        );
        assert_eq!(AuthError::UnknownSession.to_string(), "Unknown or expired session");
    }
}
