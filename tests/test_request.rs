use staticd::http::request::{Method, RequestLine};

fn line(method: &str, path: &str) -> RequestLine {
    RequestLine {
        method: method.to_string(),
        path: path.to_string(),
        version: "HTTP/1.1".to_string(),
    }
}

#[test]
fn test_method_from_str() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("HEAD"), Some(Method::HEAD));
    assert_eq!(Method::from_str("POST"), Some(Method::POST));
    assert_eq!(Method::from_str("DELETE"), Some(Method::DELETE));
    assert_eq!(Method::from_str("get"), None);
    assert_eq!(Method::from_str("BREW"), None);
}

#[test]
fn test_method_display_round_trips() {
    for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::PATCH] {
        assert_eq!(Method::from_str(&method.to_string()), Some(method));
    }
}

#[test]
fn test_only_get_and_head_are_served() {
    assert!(Method::GET.is_served());
    assert!(Method::HEAD.is_served());
    assert!(!Method::POST.is_served());
    assert!(!Method::PUT.is_served());
    assert!(!Method::OPTIONS.is_served());
}

#[test]
fn test_request_line_method() {
    assert_eq!(line("HEAD", "/").method(), Some(Method::HEAD));
    assert_eq!(line("FETCH", "/").method(), None);
}

#[test]
fn test_resource_path_strips_query_and_fragment() {
    assert_eq!(line("GET", "/app.js?v=2").resource_path(), "/app.js");
    assert_eq!(line("GET", "/doc.html#top").resource_path(), "/doc.html");
    assert_eq!(line("GET", "/a?b#c").resource_path(), "/a");
    assert_eq!(line("GET", "/plain").resource_path(), "/plain");
    assert_eq!(line("GET", "?only").resource_path(), "");
}
