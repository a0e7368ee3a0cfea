use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use seaweed::manifest::gzip;
use seaweed::transport::{Transport, Upload, UploadBody, make_url};
use seaweed::{ChunkInfo, ChunkManifest, FileId, HttpTransport, Seaweed, SeaweedConfig, SeaweedError};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone)]
struct Captured {
    fid: String,
    query: HashMap<String, String>,
    file_name: Option<String>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    content_disposition: Option<String>,
    data: Bytes,
}

#[derive(Clone)]
struct Node {
    addr: SocketAddr,
    uploads: Arc<Mutex<Vec<Captured>>>,
    next_key: Arc<Mutex<u64>>,
}

async fn assign(State(node): State<Node>, Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
    let count: u64 = form.get("count").and_then(|c| c.parse().ok()).unwrap_or(1);
    let mut key = node.next_key.lock().unwrap();
    *key += count;
    Json(json!({
        "fid": format!("1,{:x}0000cafe", *key),
        "url": node.addr.to_string(),
        "publicUrl": node.addr.to_string(),
        "count": count,
    }))
}

async fn lookup(State(node): State<Node>, Query(query): Query<HashMap<String, String>>) -> Response {
    match query.get("volumeId").map(String::as_str) {
        Some("1") => Json(json!({
            "volumeId": "1",
            "locations": [{"url": node.addr.to_string(), "publicUrl": node.addr.to_string()}],
        }))
        .into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": "volume not found"}))).into_response(),
    }
}

async fn upload(
    State(node): State<Node>,
    Path(fid): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Response {
    let Ok(Some(field)) = multipart.next_field().await else {
        return (StatusCode::BAD_REQUEST, "no file part").into_response();
    };
    assert_eq!(field.name(), Some("file"));
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let content_encoding = field
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_disposition = field
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let data = field.bytes().await.unwrap();

    match fid.as_str() {
        "1,refused" => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "disk full"}))).into_response();
        }
        "1,gateway" => return (StatusCode::BAD_GATEWAY, "upstream down").into_response(),
        _ => {}
    }
    let size = data.len();
    let name = file_name.clone().unwrap_or_default();
    node.uploads.lock().unwrap().push(Captured {
        fid,
        query,
        file_name,
        content_type,
        content_encoding,
        content_disposition,
        data,
    });
    (StatusCode::CREATED, Json(json!({"name": name, "size": size}))).into_response()
}

async fn delete(Path(fid): Path<String>) -> Response {
    match fid.as_str() {
        "1,gone" => StatusCode::NOT_FOUND.into_response(),
        "1,accepted" => StatusCode::ACCEPTED.into_response(),
        "1,readonly" => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "volume is read only"}))).into_response()
        }
        "1,raw" => (StatusCode::INTERNAL_SERVER_ERROR, "internal failure").into_response(),
        _ => StatusCode::OK.into_response(),
    }
}

async fn read(
    State(node): State<Node>,
    Path(fid): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if fid == "1,report" {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_DISPOSITION, "inline; filename=\"report.pdf\"".parse().unwrap());
        return (headers, "%PDF-1.4").into_response();
    }
    if fid == "1,zipped" && query.get("cm").map(String::as_str) == Some("false") {
        let manifest = ChunkManifest {
            name: "big.bin".to_string(),
            mime: String::new(),
            size: 3,
            chunks: vec![
                ChunkInfo { fid: FileId::new("1,c2"), offset: 2, size: 1 },
                ChunkInfo { fid: FileId::new("1,c1"), offset: 0, size: 2 },
            ],
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
        return (headers, gzip(&manifest.marshal().unwrap()).unwrap()).into_response();
    }
    let uploads = node.uploads.lock().unwrap();
    match uploads.iter().rev().find(|c| c.fid == fid) {
        Some(captured) => captured.data.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_node() -> Node {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let node = Node {
        addr: listener.local_addr().unwrap(),
        uploads: Arc::new(Mutex::new(Vec::new())),
        next_key: Arc::new(Mutex::new(0)),
    };
    let app = Router::new()
        .route("/dir/assign", post(assign))
        .route("/dir/lookup", get(lookup))
        .route("/{fid}", post(upload).delete(delete).get(read))
        .with_state(node.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    node
}

fn transport() -> HttpTransport {
    HttpTransport::new(&SeaweedConfig::default()).unwrap()
}

#[tokio::test]
async fn test_upload_sends_multipart_file() {
    let node = spawn_node().await;
    let url = make_url(&node.addr.to_string(), "/1,0a", &[("ts", "1700000000".to_string())]).unwrap();

    let ret = transport()
        .upload(
            &url,
            Upload {
                file_name: "notes.txt".to_string(),
                body: Bytes::from_static(b"hello").into(),
                is_gzipped: true,
                mime_type: Some("text/plain".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(ret.name, "notes.txt");
    assert_eq!(ret.size, 5);

    let uploads = node.uploads.lock().unwrap();
    let captured = &uploads[0];
    assert_eq!(captured.fid, "1,0a");
    assert_eq!(captured.query.get("ts").map(String::as_str), Some("1700000000"));
    assert_eq!(captured.file_name.as_deref(), Some("notes.txt"));
    assert_eq!(captured.content_type.as_deref(), Some("text/plain"));
    assert_eq!(captured.content_encoding.as_deref(), Some("gzip"));
    assert_eq!(&captured.data[..], b"hello");
}

#[tokio::test]
async fn test_upload_errors() {
    let node = spawn_node().await;
    let host = node.addr.to_string();
    let upload = || Upload {
        file_name: "a.bin".to_string(),
        body: Bytes::from_static(b"x").into(),
        is_gzipped: false,
        mime_type: None,
    };

    let url = make_url(&host, "/1,refused", &[]).unwrap();
    let err = transport().upload(&url, upload()).await.unwrap_err();
    assert!(matches!(err, SeaweedError::Remote { ref message, .. } if message == "disk full"));

    let url = make_url(&host, "/1,gateway", &[]).unwrap();
    let err = transport().upload(&url, upload()).await.unwrap_err();
    assert!(matches!(err, SeaweedError::Status { status: 502, ref body, .. } if body == "upstream down"));
}

#[tokio::test]
async fn test_upload_escapes_quotes_in_file_name() {
    let node = spawn_node().await;
    let url = make_url(&node.addr.to_string(), "/1,0b", &[]).unwrap();

    transport()
        .upload(
            &url,
            Upload {
                file_name: r#"a"b\c.txt"#.to_string(),
                body: Bytes::from_static(b"quoted").into(),
                is_gzipped: false,
                mime_type: None,
            },
        )
        .await
        .unwrap();

    let uploads = node.uploads.lock().unwrap();
    assert_eq!(
        uploads[0].content_disposition.as_deref(),
        Some(r#"form-data; name="file"; filename="a\"b\\c.txt""#)
    );
    assert_eq!(&uploads[0].data[..], b"quoted");
}

#[tokio::test]
async fn test_upload_streams_body() {
    let node = spawn_node().await;
    let url = make_url(&node.addr.to_string(), "/1,0c", &[]).unwrap();
    let (mut tx, rx) = mpsc::channel(2);
    let sender = tokio::spawn(async move {
        for piece in [&b"stre"[..], b"am", b"ed"] {
            tx.send(Ok(Bytes::from_static(piece))).await.unwrap();
        }
    });

    let ret = transport()
        .upload(
            &url,
            Upload {
                file_name: "s.bin".to_string(),
                body: UploadBody::Stream { stream: rx, len: 8 },
                is_gzipped: false,
                mime_type: None,
            },
        )
        .await
        .unwrap();
    sender.await.unwrap();
    assert_eq!(ret.size, 8);
    assert_eq!(&node.uploads.lock().unwrap()[0].data[..], b"streamed");
}

#[tokio::test]
async fn test_truncated_error_body_is_http_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = conn.read(&mut buf).await.unwrap();
        conn.write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\nshort")
            .await
            .unwrap();
        conn.shutdown().await.unwrap();
    });

    let url = make_url(&addr.to_string(), "/1,01", &[]).unwrap();
    let err = transport().get(&url).await.unwrap_err();
    assert!(matches!(err, SeaweedError::Http { .. }), "{err:?}");
}

#[tokio::test]
async fn test_delete_status_handling() {
    let node = spawn_node().await;
    let host = node.addr.to_string();
    let transport = transport();

    for fid in ["/1,gone", "/1,accepted", "/1,ok"] {
        transport.delete(&make_url(&host, fid, &[]).unwrap()).await.unwrap();
    }

    let err = transport
        .delete(&make_url(&host, "/1,readonly", &[]).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SeaweedError::Remote { ref message, .. } if message == "volume is read only"));

    let err = transport
        .delete(&make_url(&host, "/1,raw", &[]).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SeaweedError::Remote { ref message, .. } if message == "internal failure"));
}

#[tokio::test]
async fn test_download_reads_content_disposition() {
    let node = spawn_node().await;
    let url = make_url(&node.addr.to_string(), "/1,report", &[]).unwrap();

    let download = transport().download(&url).await.unwrap();
    assert_eq!(download.file_name.as_deref(), Some("report.pdf"));
    assert!(!download.is_gzipped);
    assert_eq!(&download.data[..], b"%PDF-1.4");

    let url = make_url(&node.addr.to_string(), "/1,missing", &[]).unwrap();
    let err = transport().download(&url).await.unwrap_err();
    assert!(matches!(err, SeaweedError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_client_round_trip_over_http() {
    let node = spawn_node().await;
    let client = Seaweed::new(node.addr.to_string()).unwrap();

    let fid = client
        .upload_file_part(&mut seaweed::FilePart::from_bytes("page.html", Bytes::from_static(b"<p>hi</p>")))
        .await
        .unwrap();
    let download = client.download_file(&fid, "").await.unwrap();
    assert_eq!(&download.data[..], b"<p>hi</p>");
    client.delete_file(&fid, "").await.unwrap();

    let uploads = node.uploads.lock().unwrap();
    assert_eq!(uploads[0].content_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn test_chunked_upload_over_http() {
    let node = spawn_node().await;
    let config = SeaweedConfig::new(node.addr.to_string()).with_chunk_size(4);
    let client = Seaweed::with_config(config).unwrap();

    let mut fp = seaweed::FilePart::from_bytes("big.bin", Bytes::from_static(b"0123456789"));
    let fid = client.upload_file_part(&mut fp).await.unwrap();

    let uploads = node.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 4);
    let manifest_upload = uploads.last().unwrap();
    assert_eq!(manifest_upload.fid, fid.as_str());
    assert_eq!(manifest_upload.query.get("cm").map(String::as_str), Some("true"));
    assert_eq!(manifest_upload.content_type.as_deref(), Some("application/json"));

    let manifest = ChunkManifest::load(&manifest_upload.data, false).unwrap();
    assert_eq!(manifest.chunks.len(), 3);
    assert_eq!(manifest.chunks[2].size, 2);
    assert_eq!(manifest.size, 10);
}

#[tokio::test]
async fn test_gzipped_manifest_is_decoded() {
    let node = spawn_node().await;
    let client = Seaweed::new(node.addr.to_string()).unwrap();

    let manifest = client
        .load_chunk_manifest(&FileId::new("1,zipped"), "")
        .await
        .unwrap();
    assert_eq!(manifest.name, "big.bin");
    let fids: Vec<&str> = manifest.chunks.iter().map(|c| c.fid.as_str()).collect();
    assert_eq!(fids, vec!["1,c1", "1,c2"]);
}

#[tokio::test]
async fn test_lookup_failure_over_http() {
    let node = spawn_node().await;
    let client = Seaweed::new(node.addr.to_string()).unwrap();

    let err = client
        .lookup_file_id(&FileId::new("5,01"), "", false)
        .await
        .unwrap_err();
    assert!(matches!(err, SeaweedError::Lookup { ref reason, .. } if reason == "volume not found"));
}
