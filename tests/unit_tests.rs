/// Unit tests for core pocscan modules
/// Tests the public model, pool, url and expression APIs together
use pocscan::expr::{CelLite, Environment, Evaluator, Value};
use pocscan::models::{Method, Request, Response};
use pocscan::pool::MessagePool;
use pocscan::substitution::render_path;
use pocscan::urlcodec::{decompose, recompose};

#[test]
fn test_method_display() {
    assert_eq!(Method::GET.to_string(), "GET");
    assert_eq!(Method::POST.to_string(), "POST");
    assert_eq!(Method::TRACE.to_string(), "TRACE");
    assert_eq!(Method::default(), Method::GET);
}

#[test]
fn test_pooled_objects_come_back_empty() {
    let pool = MessagePool::new(4);
    {
        let mut req = pool.requests.acquire();
        req.method = Method::PUT;
        req.url = decompose("http://h/x?y=1").unwrap();
        req.set_header("X-Probe", "1");
        req.set_body(b"payload".to_vec());

        let mut resp = pool.responses.acquire();
        resp.status = 500;
        resp.body.extend_from_slice(b"stack trace");
        resp.raw_response.push_str("HTTP/1.1 500");
    }
    let req = pool.requests.acquire();
    assert_eq!(req.method, Method::GET);
    assert!(req.headers.is_empty() && req.body.is_empty());
    assert_eq!(recompose(&req.url), "");

    let resp = pool.responses.acquire();
    assert_eq!(resp.status, 0);
    assert!(resp.body.is_empty() && resp.raw_response.is_empty());
}

#[test]
fn test_response_conditions() {
    let mut resp = Response::default();
    resp.status = 200;
    resp.url = decompose("http://h/etc/passwd").unwrap();
    resp.headers.append("Server", "Apache/2.4.49");
    resp.content_type = "text/plain".into();
    resp.body = b"root:x:0:0:root:/root:/bin/bash\n".to_vec();

    let mut req = Request::default();
    req.url = resp.url.clone();

    let mut env = Environment::new();
    env.set_request(&req);
    env.set_response(&resp);
    env.set("marker", Value::from("root:x:0"));

    let cel = CelLite::new();
    let yes = [
        "response.status == 200",
        "response.body.bcontains(b\"root:x:0:0\")",
        "\"root:[x*]:0:0\".bmatches(response.body)",
        "response.headers[\"server\"].contains(\"2.4.49\")",
        "request.url.path.endsWith(\"/passwd\")",
        "response.body.bcontains(bytes(marker)) && response.content_type.startsWith(\"text/\")",
    ];
    for expr in yes {
        assert_eq!(cel.evaluate(expr, &env), Ok(true), "{}", expr);
    }
    assert_eq!(cel.evaluate("response.status == 404 || len(response.body) == 0", &env), Ok(false));
    assert!(cel.evaluate("response.status", &env).is_err());
}

#[test]
fn test_path_substitution_with_bound_values() {
    let mut env = Environment::new();
    env.set("rand", Value::Int(31337));
    assert_eq!(render_path("/upload/{{rand}}.jsp", &env), "/upload/31337.jsp");
    assert_eq!(render_path("/{{nothing}}/index", &env), "/index");
}
