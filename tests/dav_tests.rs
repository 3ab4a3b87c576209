use std::io::Read;
use std::sync::Arc;

use dav_engine::events::{DavEvent, EventListener};
use dav_engine::memfs::MemFs;
use dav_engine::{DavHandler, body::Body};
use http::{Request, StatusCode};
use parking_lot::Mutex;

const ALICE: &str = "Basic YWxpY2U6c2VjcmV0";
const BOB: &str = "Basic Ym9iOnNlY3JldA==";
const READER: &str = "Basic cmVhZGVyOnNlY3JldA==";

const LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner>someone</D:owner>
</D:lockinfo>"#;

fn setup_fs() -> MemFs {
    let fs = MemFs::new();
    fs.create_dir("/folder").unwrap();
    fs.create_file("/folder/a.txt", "aaa").unwrap();
    fs.create_file("/folder/b.txt", "bbb").unwrap();
    fs.create_file("/doc.txt", "hello world").unwrap();
    fs
}

fn setup_users(fs: &MemFs) {
    fs.add_user("alice", "secret", true);
    fs.add_user("bob", "secret", true);
    fs.add_user("reader", "secret", false);
}

fn dav_server(fs: &MemFs) -> DavHandler {
    DavHandler::builder().resolver(fs.clone()).build_handler()
}

fn request(method: &str, uri: &str) -> http::request::Builder {
    Request::builder().method(method).uri(uri)
}

async fn resp_to_string(mut resp: http::Response<Body>) -> String {
    use futures_util::StreamExt;

    let mut data = Vec::new();
    let body = resp.body_mut();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => data.extend_from_slice(&bytes),
            Err(e) => panic!("Error reading body stream: {}", e),
        }
    }

    String::from_utf8(data).unwrap_or_else(|_| "".to_string())
}

async fn lock(server: &DavHandler, uri: &str, auth: &str) -> http::Response<Body> {
    let req = request("LOCK", uri)
        .header("Authorization", auth)
        .body(Body::from(LOCKINFO))
        .unwrap();
    server.handle(req).await
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<DavEvent>>>);

impl EventListener for Recorder {
    fn on_event(&self, event: &DavEvent) {
        self.0.lock().push(event.clone());
    }
}

#[tokio::test]
async fn test_lock_conflict_and_unlock() {
    let fs = setup_fs();
    setup_users(&fs);
    let server = dav_server(&fs);

    let resp = lock(&server, "/doc.txt", ALICE).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = resp.headers().get("lock-token").unwrap().clone();
    let body = resp_to_string(resp).await;
    assert!(body.contains("<D:locktoken><D:href>opaquelocktoken:"));
    assert!(body.contains("<D:lockroot><D:href>/doc.txt</D:href></D:lockroot>"));

    let resp = lock(&server, "/doc.txt", BOB).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    let req = request("UNLOCK", "/doc.txt")
        .header("Authorization", ALICE)
        .header("Lock-Token", token)
        .body(Body::empty())
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = lock(&server, "/doc.txt", BOB).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_lock_blocks_put_without_token() {
    let fs = setup_fs();
    setup_users(&fs);
    let server = dav_server(&fs);

    let resp = lock(&server, "/doc.txt", ALICE).await;
    let token = resp.headers().get("lock-token").unwrap().to_str().unwrap().to_string();

    let req = request("PUT", "/doc.txt")
        .header("Authorization", BOB)
        .body(Body::from("bob was here"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::LOCKED);

    // submitting the token in an If header lifts the lock check.
    let req = request("PUT", "/doc.txt")
        .header("Authorization", BOB)
        .header("If", format!("({})", token))
        .body(Body::from("bob was here"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(fs.read_file("/doc.txt").unwrap().as_ref(), b"bob was here");
}

#[tokio::test]
async fn test_lock_null_resource() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("LOCK", "/folder/new.txt")
        .body(Body::from(LOCKINFO))
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(resp.headers().contains_key("lock-token"));
    assert!(fs.exists("/folder/new.txt"));

    let req = request("LOCK", "/nowhere/new.txt")
        .body(Body::from(LOCKINFO))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_propfind_depth_one_default_props() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("PROPFIND", "/folder")
        .header("Depth", "1")
        .body(Body::empty())
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);

    let body = resp_to_string(resp).await;
    assert_eq!(body.matches("<D:response>").count(), 3);
    assert_eq!(body.matches("<D:resourcetype").count(), 3);
    assert_eq!(body.matches("<D:getlastmodified>").count(), 3);
    assert_eq!(body.matches("<D:displayname>").count(), 3);
    assert!(body.contains("<D:href>/folder/</D:href>"));
    assert!(body.contains("<D:href>/folder/a.txt</D:href>"));
    assert!(body.contains("<D:href>/folder/b.txt</D:href>"));
    assert!(body.contains("<D:collection />"));
}

#[tokio::test]
async fn test_propfind_depth_zero() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("PROPFIND", "/folder/")
        .header("Depth", "0")
        .body(Body::empty())
        .unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert_eq!(body.matches("<D:response>").count(), 1);

    let req = request("PROPFIND", "/folder/")
        .header("Depth", "2")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_blocked_by_foreign_lock() {
    let fs = setup_fs();
    setup_users(&fs);
    let server = dav_server(&fs);

    let resp = lock(&server, "/folder/b.txt", ALICE).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = request("DELETE", "/folder")
        .header("Authorization", BOB)
        .body(Body::empty())
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let body = resp_to_string(resp).await;
    assert!(body.contains("<D:href>/folder/b.txt</D:href>"));
    assert!(body.contains("HTTP/1.1 423 Locked"));
    assert!(fs.exists("/folder/b.txt"));
    assert!(fs.exists("/folder"));
}

#[tokio::test]
async fn test_delete_tree() {
    let fs = setup_fs();
    let recorder = Recorder::default();
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .event_listener(recorder.clone())
        .build_handler();

    let req = request("DELETE", "/folder").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NO_CONTENT);
    assert!(!fs.exists("/folder"));
    assert!(!fs.exists("/folder/a.txt"));

    let deleted = recorder
        .0
        .lock()
        .iter()
        .filter(|e| matches!(e, DavEvent::Delete { .. }))
        .count();
    assert_eq!(deleted, 3);

    let req = request("DELETE", "/folder").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_copy_overwrite() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("COPY", "/doc.txt")
        .header("Destination", "/folder/a.txt")
        .header("Overwrite", "F")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(fs.read_file("/folder/a.txt").unwrap().as_ref(), b"aaa");

    let req = request("COPY", "/doc.txt")
        .header("Destination", "http://localhost/folder/a.txt")
        .header("Overwrite", "T")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(fs.read_file("/folder/a.txt").unwrap().as_ref(), b"hello world");

    let req = request("COPY", "/doc.txt")
        .header("Destination", "/folder/c.txt")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::CREATED);
    assert!(fs.exists("/doc.txt"));
}

#[tokio::test]
async fn test_overwrite_locked_destination() {
    let fs = setup_fs();
    setup_users(&fs);
    let server = dav_server(&fs);

    let resp = lock(&server, "/folder/a.txt", ALICE).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = request("COPY", "/doc.txt")
        .header("Authorization", BOB)
        .header("Destination", "/folder/a.txt")
        .header("Overwrite", "T")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn test_move() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("MOVE", "/folder")
        .header("Destination", "/renamed")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::CREATED);
    assert!(!fs.exists("/folder"));
    assert_eq!(fs.read_file("/renamed/b.txt").unwrap().as_ref(), b"bbb");

    // into itself.
    let req = request("MOVE", "/renamed")
        .header("Destination", "/renamed/sub")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::FORBIDDEN);

    // missing parent.
    let req = request("MOVE", "/doc.txt")
        .header("Destination", "/nowhere/doc.txt")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::CONFLICT);

    let req = request("MOVE", "/doc.txt")
        .header("Destination", "/renamed/doc.txt")
        .header("Depth", "0")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_copy_move_onto_ancestor() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    for method in ["MOVE", "COPY"] {
        let req = request(method, "/folder/a.txt")
            .header("Destination", "/folder")
            .header("Overwrite", "T")
            .body(Body::empty())
            .unwrap();
        assert_eq!(server.handle(req).await.status(), StatusCode::FORBIDDEN);
    }

    let req = request("MOVE", "/folder/a.txt")
        .header("Destination", "/")
        .header("Overwrite", "T")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::FORBIDDEN);

    assert_eq!(fs.read_file("/folder/a.txt").unwrap().as_ref(), b"aaa");
    assert_eq!(fs.read_file("/folder/b.txt").unwrap().as_ref(), b"bbb");
    assert!(fs.exists("/doc.txt"));
}

#[tokio::test]
async fn test_proppatch_then_propfind() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let patch = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:set><D:prop><Z:color>red</Z:color></D:prop></D:set>
</D:propertyupdate>"#;
    let req = request("PROPPATCH", "/doc.txt").body(Body::from(patch)).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let body = resp_to_string(resp).await;
    assert!(body.contains("HTTP/1.1 200 OK"));

    let find = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:prop><Z:color/><Z:missing/><D:displayname/></D:prop>
</D:propfind>"#;
    let req = request("PROPFIND", "/doc.txt")
        .header("Depth", "0")
        .body(Body::from(find))
        .unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(body.contains(">red</"));
    assert!(body.contains("HTTP/1.1 200 OK"));
    assert!(body.contains("HTTP/1.1 404 Not Found"));
    assert!(body.contains("missing"));

    let patch = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:remove><D:prop><Z:color/></D:prop></D:remove>
</D:propertyupdate>"#;
    let req = request("PROPPATCH", "/doc.txt").body(Body::from(patch)).unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(body.contains("HTTP/1.1 200 OK"));

    let find = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:prop><Z:color/></D:prop>
</D:propfind>"#;
    let req = request("PROPFIND", "/doc.txt")
        .header("Depth", "0")
        .body(Body::from(find))
        .unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(!body.contains(">red</"));
    assert!(!body.contains("HTTP/1.1 200 OK"));
    assert!(body.contains("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn test_proppatch_all_or_nothing() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let patch = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:set><D:prop><Z:color>red</Z:color></D:prop></D:set>
  <D:set><D:prop><D:getetag>"forged"</D:getetag></D:prop></D:set>
</D:propertyupdate>"#;
    let req = request("PROPPATCH", "/doc.txt").body(Body::from(patch)).unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(body.contains("HTTP/1.1 403 Forbidden"));
    assert!(body.contains("HTTP/1.1 424 Failed Dependency"));

    let find = r#"<D:propfind xmlns:D="DAV:" xmlns:Z="urn:example:props"><D:prop><Z:color/></D:prop></D:propfind>"#;
    let req = request("PROPFIND", "/doc.txt")
        .header("Depth", "0")
        .body(Body::from(find))
        .unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(!body.contains(">red</"));
}

#[tokio::test]
async fn test_unauthenticated_challenges() {
    let fs = setup_fs();
    setup_users(&fs);
    let server = dav_server(&fs);

    let req = request("GET", "/doc.txt").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenges: Vec<_> = resp
        .headers()
        .get_all("www-authenticate")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(challenges.len(), 2);
    assert!(challenges[0].starts_with("Basic realm="));
    assert!(challenges[1].starts_with("Digest realm="));

    let req = request("GET", "/doc.txt")
        .header("Authorization", "Basic YWxpY2U6d3Jvbmc=")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::UNAUTHORIZED);

    let req = request("GET", "/doc.txt")
        .header("Authorization", READER)
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_read_only_user_cannot_write() {
    let fs = setup_fs();
    setup_users(&fs);
    let server = dav_server(&fs);

    let req = request("PUT", "/doc.txt")
        .header("Authorization", READER)
        .body(Body::from("nope"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(fs.read_file("/doc.txt").unwrap().as_ref(), b"hello world");
}

#[tokio::test]
async fn test_options() {
    let fs = setup_fs();
    setup_users(&fs);
    let server = dav_server(&fs);

    let req = request("OPTIONS", "/doc.txt").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let dav = resp.headers().get("dav").unwrap().to_str().unwrap();
    assert!(dav.contains('2'));
    let allow = resp.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("LOCK"));
}

#[tokio::test]
async fn test_unknown_and_unsupported_methods() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("FROBNICATE", "/doc.txt").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NOT_IMPLEMENTED);

    let req = request("MKCOL", "/folder").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::METHOD_NOT_ALLOWED);

    // the root cannot be deleted.
    let req = request("DELETE", "/").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::METHOD_NOT_ALLOWED);

    let server = DavHandler::builder()
        .resolver(fs.clone())
        .pretend_unsupported(true)
        .build_handler();
    let req = request("DELETE", "/").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_mkcol() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("MKCOL", "/folder/sub").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(fs.exists("/folder/sub"));

    let req = request("MKCOL", "/missing/sub").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::CONFLICT);

    let req = request("MKCOL", "/folder/other")
        .body(Body::from("<x/>"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_put_and_get() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("PUT", "/deep/er/new.txt")
        .body(Body::from("0123456789"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::CREATED);
    assert!(fs.exists("/deep/er"));

    let req = request("PUT", "/deep/er/new.txt")
        .body(Body::from("abcdefghij"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NO_CONTENT);

    let req = request("GET", "/deep/er/new.txt").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("etag"));
    assert_eq!(resp_to_string(resp).await, "abcdefghij");

    let req = request("HEAD", "/deep/er/new.txt").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.headers().get("content-length").unwrap(), "10");
    assert_eq!(resp_to_string(resp).await, "");
}

#[tokio::test]
async fn test_get_ranges() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("GET", "/doc.txt")
        .header("Range", "bytes=0-4")
        .body(Body::empty())
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers().get("content-range").unwrap(), "bytes 0-4/11");
    assert_eq!(resp_to_string(resp).await, "hello");

    let req = request("GET", "/doc.txt")
        .header("Range", "bytes=100-200")
        .body(Body::empty())
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(resp.headers().get("content-range").unwrap(), "bytes */11");
}

#[tokio::test]
async fn test_get_conditional() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("GET", "/doc.txt").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    let etag = resp.headers().get("etag").unwrap().clone();

    let req = request("GET", "/doc.txt")
        .header("If-None-Match", etag)
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NOT_MODIFIED);

    let req = request("PUT", "/doc.txt")
        .header("If-Match", "\"no-such-tag\"")
        .body(Body::from("x"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_gzip_compression() {
    let fs = setup_fs();
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .compression(true)
        .build_handler();

    let req = request("GET", "/doc.txt")
        .header("Accept-Encoding", "gzip, deflate")
        .body(Body::empty())
        .unwrap();
    let mut resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-encoding").unwrap(), "gzip");

    use futures_util::StreamExt;
    let mut data = Vec::new();
    while let Some(chunk) = resp.body_mut().next().await {
        data.extend_from_slice(&chunk.unwrap());
    }
    let mut text = String::new();
    flate2::read::GzDecoder::new(&data[..])
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "hello world");

    let req = request("GET", "/doc.txt").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    assert!(resp.headers().get("content-encoding").is_none());
}

#[tokio::test]
async fn test_quota_exceeded() {
    let fs = MemFs::with_quota(16);
    let server = dav_server(&fs);

    let req = request("PUT", "/small.txt").body(Body::from("tiny")).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::CREATED);

    let req = request("PUT", "/big.txt")
        .body(Body::from("far too much data for this"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::INSUFFICIENT_STORAGE);
    assert!(!fs.exists("/big.txt"));
}

#[tokio::test]
async fn test_prefix_and_methods() {
    let fs = setup_fs();
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .strip_prefix("/dav")
        .methods(dav_engine::DavMethodSet::read_only())
        .build_handler();

    let req = request("PROPFIND", "/dav/folder/")
        .header("Depth", "1")
        .body(Body::empty())
        .unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(body.contains("<D:href>/dav/folder/a.txt</D:href>"));

    let req = request("DELETE", "/dav/doc.txt").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(fs.exists("/doc.txt"));
}

struct Teapot;

impl dav_engine::filter::Filter for Teapot {
    fn process(
        &self,
        chain: dav_engine::filter::FilterChain<'_>,
        req: &mut dav_engine::request::DavRequest,
        res: Option<&dyn dav_engine::resource::Resource>,
    ) -> dav_engine::DavResult<http::Response<Body>> {
        if req.path().file_name_str() == "teapot" {
            return Ok(dav_engine::status_response(StatusCode::IM_A_TEAPOT));
        }
        chain.process(req, res)
    }
}

#[tokio::test]
async fn test_filter_chain() {
    let fs = setup_fs();
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .filter(Teapot)
        .build_handler();

    let req = request("GET", "/teapot").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::IM_A_TEAPOT);

    let req = request("GET", "/doc.txt").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unregistered_method() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("POST", "/doc.txt").body(Body::from("x=1")).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_propfind_propname() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let find = r#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
    let req = request("PROPFIND", "/doc.txt")
        .header("Depth", "0")
        .body(Body::from(find))
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let body = resp_to_string(resp).await;
    assert!(body.contains("<D:displayname />"));
    assert!(body.contains("<D:getetag />"));
    assert!(!body.contains("hello world"));
}

struct PostEcho;

impl dav_engine::methods::MethodHandler for PostEcho {
    fn methods(&self) -> &[dav_engine::DavMethod] {
        &[dav_engine::DavMethod::Post]
    }

    fn is_compatible(&self, res: &dyn dav_engine::resource::Resource) -> bool {
        res.as_getable().is_some()
    }

    fn process_resource(
        &self,
        _ctx: &dav_engine::DavContext,
        req: &mut dav_engine::request::DavRequest,
        _res: &dyn dav_engine::resource::Resource,
    ) -> dav_engine::DavResult<http::Response<Body>> {
        let mut resp = http::Response::new(Body::from(format!("posted to {}", req.path().file_name_str())));
        *resp.status_mut() = StatusCode::OK;
        Ok(resp)
    }
}

#[tokio::test]
async fn test_custom_method_handler() {
    let fs = setup_fs();
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .method_handler(PostEcho)
        .build_handler();

    let req = request("POST", "/doc.txt").body(Body::from("x=1")).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp_to_string(resp).await, "posted to doc.txt");

    let req = request("POST", "/missing.txt").body(Body::empty()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NOT_FOUND);
}

struct Answer;

impl dav_engine::props::PropertySource for Answer {
    fn property_access(
        &self,
        name: &dav_engine::props::QName,
        _res: &dyn dav_engine::resource::Resource,
    ) -> dav_engine::props::PropertyAccess {
        if name.namespace == "urn:example" && name.name == "answer" {
            dav_engine::props::PropertyAccess::ReadOnly
        } else {
            dav_engine::props::PropertyAccess::Unknown
        }
    }

    fn get_property(
        &self,
        _name: &dav_engine::props::QName,
        _res: &dyn dav_engine::resource::Resource,
    ) -> dav_engine::DavResult<Option<dav_engine::props::PropValue>> {
        Ok(Some(dav_engine::props::PropValue::Text("42".to_string())))
    }

    fn set_property(
        &self,
        _name: &dav_engine::props::QName,
        _value: &xmltree::Element,
        _res: &dyn dav_engine::resource::Resource,
    ) -> dav_engine::DavResult<()> {
        Err(dav_engine::DavError::Status(StatusCode::FORBIDDEN))
    }

    fn clear_property(
        &self,
        _name: &dav_engine::props::QName,
        _res: &dyn dav_engine::resource::Resource,
    ) -> dav_engine::DavResult<()> {
        Err(dav_engine::DavError::Status(StatusCode::FORBIDDEN))
    }

    fn all_property_names(&self, _res: &dyn dav_engine::resource::Resource) -> Vec<dav_engine::props::QName> {
        vec![dav_engine::props::QName::new("urn:example", "answer")]
    }
}

#[tokio::test]
async fn test_custom_property_source() {
    let fs = setup_fs();
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .property_source(dav_engine::propsources::WebDavPropertySource)
        .property_source(Answer)
        .build_handler();

    let find = r#"<D:propfind xmlns:D="DAV:" xmlns:E="urn:example">
        <D:prop><E:answer/><D:displayname/></D:prop></D:propfind>"#;
    let req = request("PROPFIND", "/doc.txt")
        .header("Depth", "0")
        .body(Body::from(find))
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let body = resp_to_string(resp).await;
    assert!(body.contains(">42</"));
    assert!(body.contains(">doc.txt</"));

    let patch = r#"<D:propertyupdate xmlns:D="DAV:" xmlns:E="urn:example">
        <D:set><D:prop><E:answer>7</E:answer></D:prop></D:set></D:propertyupdate>"#;
    let req = request("PROPPATCH", "/doc.txt").body(Body::from(patch)).unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(body.contains("403 Forbidden"));
}

#[tokio::test]
async fn test_basic_only_auth_and_realm() {
    let ls = dav_engine::memls::MemLs::new().max_timeout(Some(120));
    let fs = MemFs::with_lock_manager(ls, "test realm");
    fs.create_file("/doc.txt", "hello world").unwrap();
    setup_users(&fs);
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .auth_handler(dav_engine::auth::BasicAuthHandler)
        .build_handler();

    let req = request("GET", "/doc.txt").body(Body::empty()).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenges: Vec<_> = resp.headers().get_all("www-authenticate").iter().collect();
    assert_eq!(challenges.len(), 1);
    assert_eq!(challenges[0], "Basic realm=\"test realm\"");

    let req = request("LOCK", "/doc.txt")
        .header("Authorization", ALICE)
        .header("Timeout", "Second-3600")
        .body(Body::from(LOCKINFO))
        .unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp_to_string(resp).await;
    assert!(body.contains("<D:timeout>Second-120</D:timeout>"));
}

#[test]
fn test_handle_blocking() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = Request::builder()
        .method("PUT")
        .uri("/new.txt")
        .body(bytes::Bytes::from_static(b"blocking"))
        .unwrap();
    assert_eq!(server.handle_blocking(req).status(), StatusCode::CREATED);
    assert_eq!(fs.read_file("/new.txt").unwrap(), "blocking");

    let req = Request::builder()
        .method("DELETE")
        .uri("/new.txt")
        .body(bytes::Bytes::new())
        .unwrap();
    assert_eq!(server.handle_blocking(req).status(), StatusCode::NO_CONTENT);
    assert!(!fs.exists("/new.txt"));
}

#[tokio::test]
async fn test_put_content_range() {
    let fs = setup_fs();
    let server = dav_server(&fs);

    let req = request("PUT", "/folder/a.txt")
        .header("Content-Range", "bytes 3-5/*")
        .body(Body::from("xyz"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(fs.read_file("/folder/a.txt").unwrap().as_ref(), b"aaaxyz");

    // starts past the end of the content.
    let req = request("PUT", "/folder/a.txt")
        .header("Content-Range", "bytes 100-101/*")
        .body(Body::from("zz"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    let req = request("PUT", "/folder/a.txt")
        .header("Content-Range", "bytes 18446744073709551610-18446744073709551610/*")
        .body(Body::from("z"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    assert_eq!(fs.read_file("/folder/a.txt").unwrap().as_ref(), b"aaaxyz");
}

#[tokio::test]
async fn test_property_source_order() {
    let fs = setup_fs();
    let patch = r#"<D:propertyupdate xmlns:D="DAV:" xmlns:E="urn:example">
        <D:set><D:prop><E:answer>7</E:answer></D:prop></D:set></D:propertyupdate>"#;
    let req = request("PROPPATCH", "/doc.txt").body(Body::from(patch)).unwrap();
    let body = resp_to_string(dav_server(&fs).handle(req).await).await;
    assert!(body.contains("HTTP/1.1 200 OK"));

    let find = r#"<D:propfind xmlns:D="DAV:" xmlns:E="urn:example">
        <D:prop><E:answer/></D:prop></D:propfind>"#;

    // the source registered first owns the name.
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .property_source(Answer)
        .property_source(dav_engine::propsources::CustomPropertySource)
        .build_handler();
    let req = request("PROPFIND", "/doc.txt")
        .header("Depth", "0")
        .body(Body::from(find))
        .unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(body.contains(">42</"));
    assert!(!body.contains(">7</"));

    let server = DavHandler::builder()
        .resolver(fs.clone())
        .property_source(dav_engine::propsources::CustomPropertySource)
        .property_source(Answer)
        .build_handler();
    let req = request("PROPFIND", "/doc.txt")
        .header("Depth", "0")
        .body(Body::from(find))
        .unwrap();
    let body = resp_to_string(server.handle(req).await).await;
    assert!(body.contains(">7</"));
    assert!(!body.contains(">42</"));
}

#[tokio::test]
async fn test_lock_owner_needs_login() {
    use dav_engine::ls::{LockInfo, LockTimeout};
    use dav_engine::resource::ResourceResolver;

    let fs = setup_fs();
    let res = fs.resolve("localhost", "/doc.txt").unwrap().unwrap();
    let locked = res
        .as_lockable()
        .unwrap()
        .lock(&LockTimeout::seconds(60), &LockInfo::exclusive_write(Some("alice")))
        .unwrap();
    assert!(locked.is_success());

    // Basic is not configured, so the header names alice without a login.
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .auth_handler(dav_engine::auth::DigestAuthHandler)
        .build_handler();
    let req = request("PUT", "/doc.txt")
        .header("Authorization", ALICE)
        .body(Body::from("changed"))
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::LOCKED);
    assert_eq!(fs.read_file("/doc.txt").unwrap().as_ref(), b"hello world");
}

struct Panicky;

impl dav_engine::filter::Filter for Panicky {
    fn process(
        &self,
        _chain: dav_engine::filter::FilterChain<'_>,
        _req: &mut dav_engine::request::DavRequest,
        _res: Option<&dyn dav_engine::resource::Resource>,
    ) -> dav_engine::DavResult<http::Response<Body>> {
        panic!("filter failed");
    }
}

#[test]
fn test_handle_blocking_panic() {
    let fs = setup_fs();
    let server = DavHandler::builder()
        .resolver(fs.clone())
        .filter(Panicky)
        .build_handler();

    let req = Request::builder()
        .method("GET")
        .uri("/doc.txt")
        .body(bytes::Bytes::new())
        .unwrap();
    let resp = server.handle_blocking(req);
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("connection").unwrap(), "close");
}

#[test]
fn test_method_conversion() {
    use dav_engine::{DavMethod, InvalidMethod};

    let get: Result<DavMethod, InvalidMethod> = DavMethod::try_from(&http::Method::GET);
    assert_eq!(get.unwrap(), DavMethod::Get);

    let frob = http::Method::from_bytes(b"FROBNICATE").unwrap();
    let err: Result<DavMethod, InvalidMethod> = DavMethod::try_from(&frob);
    assert!(err.is_err());
}
