use std::sync::Arc;

use http::{HeaderValue, Method};
use proptest::prelude::*;

use dog_tus::headers::{TUS_RESUMABLE, X_HTTP_METHOD_OVERRIDE};
use dog_tus::intent::determine_intent;
use dog_tus::operations::Operation;
use dog_tus::prelude::*;
use dog_tus::{parse_metadata, FileConcat};

fn ctx(request: TusRequest) -> TusContext {
    TusContext::new(request, Arc::new(MemoryStore::new()), Arc::new(TusConfig::default()))
}

fn method() -> impl Strategy<Value = Method> {
    prop::sample::select(vec![
        Method::GET,
        Method::HEAD,
        Method::PATCH,
        Method::POST,
        Method::DELETE,
        Method::PUT,
    ])
}

proptest! {
    #[test]
    fn requests_without_version_header_are_ignored(
        method in method(),
        path in "/[a-z]{0,8}(/[a-z0-9]{1,8})?",
    ) {
        let ctx = ctx(TusRequest::new(method, path));
        prop_assert!(determine_intent(&ctx).is_none());
    }

    #[test]
    fn head_on_any_upload_url_is_file_info(
        id in "[A-Za-z0-9_-]{1,32}",
        trailing in prop::bool::ANY,
    ) {
        let path = format!("/files/{}{}", id, if trailing { "/" } else { "" });
        let ctx = ctx(
            TusRequest::new(Method::HEAD, path)
                .with_header(TUS_RESUMABLE, HeaderValue::from_static("1.0.0")),
        );

        prop_assert!(matches!(determine_intent(&ctx), Some(Operation::GetFileInfo(_))));
        prop_assert_eq!(ctx.file_id_from_url(), Some(ResourceId::from(id.as_str())));
    }

    #[test]
    fn method_override_wins_over_request_method(method in method()) {
        let ctx = ctx(
            TusRequest::new(method, "/files/abc")
                .with_header(TUS_RESUMABLE, HeaderValue::from_static("1.0.0"))
                .with_header(X_HTTP_METHOD_OVERRIDE, HeaderValue::from_static("DELETE")),
        );

        prop_assert!(matches!(determine_intent(&ctx), Some(Operation::DeleteFile(_))));
    }

    #[test]
    fn metadata_parsing_never_panics(header in "[ -~]{0,64}") {
        let _ = parse_metadata(&header);
    }

    #[test]
    fn concat_header_parsing_never_panics(header in "(final;|partial)?[ -~]{0,48}") {
        if let Ok(FileConcat::Final { partials }) = FileConcat::parse(&header, "/files") {
            prop_assert!(!partials.is_empty());
        }
    }
}
