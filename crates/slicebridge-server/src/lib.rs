//! HTTP front-end for slicebridge.
//!
//! Routes:
//! - `POST /import?filename=..` (profile text as body) or `POST /import?path=..`
//! - `GET /profiles` and `GET /profiles/{name}`
//! - `POST /slice` (JSON body), blocking until the job ends
//! - `POST /cancel?output=..`
//! - `GET /health`, `GET /properties`
//!
//! Each request runs on its own thread so a cancel can reach a running slice.
//! The [`TestServer`] helper starts a server on a random port for integration testing.

use serde::Deserialize;
use slicebridge_core::{
    import_profile, CoreError, ImportRequest, ImportSource, SliceRequest, Slicer,
};
use slicebridge_profile::{BedShape, Overrides, PrinterGeometry, ProfileError};
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

/// Query values that count as "yes".
const BOOLEAN_TRUES: [&str; 5] = ["true", "yes", "y", "1", "on"];

fn respond_err(req: Request, code: u16, msg: &str) {
    let _ = req.respond(Response::from_string(msg).with_status_code(StatusCode(code)));
}

fn json_header() -> Header {
    Header::from_bytes("Content-Type", "application/json").expect("valid header")
}

fn respond_json(req: Request, code: u16, json: &serde_json::Value) {
    let response = Response::from_string(json.to_string())
        .with_status_code(StatusCode(code))
        .with_header(json_header());
    let _ = req.respond(response);
}

fn read_body(req: &mut Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

/// Split a request URL into its path and decoded query pairs.
pub fn split_url(url: &str) -> (&str, HashMap<String, String>) {
    match url.split_once('?') {
        Some((path, query)) => {
            let params = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
            (path, params)
        }
        None => (url, HashMap::new()),
    }
}

fn is_true(value: &str) -> bool {
    BOOLEAN_TRUES.contains(&value.to_ascii_lowercase().as_str())
}

/// HTTP status for a core error.
pub fn status_for(err: &CoreError) -> u16 {
    match err {
        CoreError::Profile(ProfileError::AlreadyExists(_)) | CoreError::JobAlreadyRunning(_) => {
            409
        }
        e if e.is_input_error() => 400,
        e if e.is_config_error() => 503,
        _ => 500,
    }
}

fn handle_import(slicer: &Slicer, mut req: Request, params: &HashMap<String, String>) {
    let source = if let Some(path) = params.get("path") {
        ImportSource::Path(PathBuf::from(path))
    } else if let Some(filename) = params.get("filename") {
        let Some(body) = read_body(&mut req) else {
            respond_err(req, 500, "read error");
            return;
        };
        if body.is_empty() {
            respond_err(req, 400, "No file included");
            return;
        }
        ImportSource::Upload {
            filename: filename.clone(),
            contents: String::from_utf8_lossy(&body).into_owned(),
        }
    } else {
        respond_err(req, 400, "No file included");
        return;
    };

    let mut request = ImportRequest::new(source);
    request.name = params.get("name").cloned();
    request.display_name = params.get("displayName").cloned();
    request.description = params.get("description").cloned();
    request.allow_overwrite = params.get("allowOverwrite").is_some_and(|v| is_true(v));

    let library = match slicer.library() {
        Ok(l) => l,
        Err(e) => {
            error!("import: {e}");
            respond_err(req, status_for(&e), &e.to_string());
            return;
        }
    };

    match import_profile(&library, slicer.table(), &request, &chrono::Local::now()) {
        Ok(imported) => {
            let resource = format!("/profiles/{}", imported.name);
            let body = serde_json::json!({
                "resource": resource,
                "displayName": imported.display_name,
                "description": imported.description,
            });
            let location =
                Header::from_bytes("Location", resource.as_bytes()).expect("valid header");
            let response = Response::from_string(body.to_string())
                .with_status_code(StatusCode(201))
                .with_header(json_header())
                .with_header(location);
            let _ = req.respond(response);
        }
        Err(e) => {
            let code = status_for(&e);
            warn!("import failed ({code}): {e}");
            let msg = if code == 500 {
                format!("Something went wrong while converting imported profile: {e}")
            } else {
                e.to_string()
            };
            respond_err(req, code, &msg);
        }
    }
}

fn handle_profile(slicer: &Slicer, req: Request, name: &str) {
    let result = slicer
        .library()
        .and_then(|library| library.load(slicer.table(), name));
    match result {
        Ok(profile) => {
            let body = serde_json::json!({
                "name": name,
                "displayName": profile.display_name,
                "description": profile.description,
                "data": profile.values(),
            });
            respond_json(req, 200, &body);
        }
        Err(CoreError::Profile(ProfileError::NotFound(_))) => respond_err(req, 404, "not found"),
        Err(e) => respond_err(req, status_for(&e), &e.to_string()),
    }
}

fn handle_profile_list(slicer: &Slicer, req: Request) {
    match slicer.library().and_then(|library| library.list()) {
        Ok(names) => respond_json(req, 200, &serde_json::json!(names)),
        Err(e) => respond_err(req, status_for(&e), &e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct BedBody {
    width: f64,
    depth: f64,
    #[serde(default)]
    circular: bool,
}

/// JSON body of `POST /slice`.
#[derive(Debug, Deserialize)]
struct SliceBody {
    model: PathBuf,
    #[serde(default)]
    output: Option<PathBuf>,
    #[serde(default)]
    profile: Option<PathBuf>,
    #[serde(default)]
    position: Option<[f64; 2]>,
    bed: BedBody,
    nozzle_diameter: f64,
    #[serde(default)]
    overrides: Overrides,
}

impl SliceBody {
    fn into_request(self) -> SliceRequest {
        let geometry = PrinterGeometry {
            bed_width: self.bed.width,
            bed_depth: self.bed.depth,
            bed_shape: if self.bed.circular {
                BedShape::Circular
            } else {
                BedShape::Rectangular
            },
            nozzle_diameter: self.nozzle_diameter,
        };
        let mut request = SliceRequest::new(self.model, geometry);
        request.output = self.output;
        request.profile = self.profile;
        request.position = self.position.map(|[x, y]| (x, y));
        request.overrides = self.overrides;
        request
    }
}

fn handle_slice(slicer: &Slicer, mut req: Request) {
    let Some(body) = read_body(&mut req) else {
        respond_err(req, 500, "read error");
        return;
    };
    let body: SliceBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            respond_err(req, 400, &format!("invalid slice request: {e}"));
            return;
        }
    };
    let request = body.into_request();
    info!("slicing {}", request.model.display());

    match slicer.slice(&request) {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(json) => respond_json(req, 200, &json),
            Err(e) => respond_err(req, 500, &e.to_string()),
        },
        Err(e) => {
            let code = status_for(&e);
            warn!("slice of {} refused ({code}): {e}", request.model.display());
            respond_err(req, code, &e.to_string());
        }
    }
}

fn handle_cancel(slicer: &Slicer, req: Request, params: &HashMap<String, String>) {
    let Some(output) = params.get("output") else {
        respond_err(req, 400, "missing output");
        return;
    };
    slicer.cancel(&PathBuf::from(output));
    let _ = req.respond(Response::empty(204));
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(slicer: &Slicer, req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let (path, params) = split_url(&url);
    match (&method, path) {
        (Method::Post, "/import") => handle_import(slicer, req, &params),
        (Method::Get, "/profiles") => handle_profile_list(slicer, req),
        (Method::Get, p) if p.starts_with("/profiles/") => {
            let name = p.strip_prefix("/profiles/").unwrap_or_default();
            handle_profile(slicer, req, name);
        }
        (Method::Post, "/slice") => handle_slice(slicer, req),
        (Method::Post, "/cancel") => handle_cancel(slicer, req, &params),
        (Method::Get, "/health") => {
            let body = serde_json::json!({
                "status": "ok",
                "engine_configured": slicer.is_engine_configured(),
            });
            respond_json(req, 200, &body);
        }
        (Method::Get, "/properties") => match serde_json::to_value(Slicer::properties()) {
            Ok(json) => respond_json(req, 200, &json),
            Err(e) => respond_err(req, 500, &e.to_string()),
        },
        (
            _,
            "/import" | "/profiles" | "/slice" | "/cancel" | "/health" | "/properties",
        ) => respond_err(req, 405, "method not allowed"),
        _ => respond_err(req, 404, "not found"),
    }
}

fn serve(server: &Server, slicer: &Arc<Slicer>) {
    for request in server.incoming_requests() {
        let slicer = Arc::clone(slicer);
        let spawned = std::thread::Builder::new()
            .name("slicebridge-request".to_owned())
            .spawn(move || handle_request(&slicer, request));
        if let Err(e) = spawned {
            error!("could not spawn request thread: {e}");
        }
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(
    slicer: &Arc<Slicer>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(addr)?;
    serve(&server, slicer);
    Ok(())
}

/// A test helper that starts a slicebridge server on a random port in a background thread.
///
/// Drop the `TestServer` to stop the server (via `Server::unblock`).
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub slicer: Arc<Slicer>,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Binds to `127.0.0.1:0` (random port).
    pub fn start(slicer: Slicer) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let slicer = Arc::new(slicer);
        let srv = Arc::clone(&server);
        let shared = Arc::clone(&slicer);
        let handle = std::thread::spawn(move || serve(&srv, &shared));

        Self {
            url,
            port,
            slicer,
            server,
            _handle: handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
