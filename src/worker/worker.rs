use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::protocol::{
    Decoded, Request, RequestKind, RequestType, Response, ResponseBody, SurfaceSize,
    decode_request,
};
use crate::config::{ConfigPatch, ProcessingConfig};
use crate::decode::{DecodePrimitive, RqrrDecoder};
use crate::enhance::Enhancer;
use crate::error::{ScanError, ScanResult};
use crate::mrz::parse_mrz;
use crate::pipeline::DecodeSession;

/// Loads the decode primitive on `init`
pub type PrimitiveFactory = Box<dyn Fn() -> ScanResult<Box<dyn DecodePrimitive>> + Send>;

/// Builds the enhancer for a new session
pub type EnhancerFactory = Box<dyn Fn() -> Enhancer + Send>;

fn load(factory: &PrimitiveFactory) -> ScanResult<Box<dyn DecodePrimitive>> {
    factory().map_err(|e| {
        if matches!(e, ScanError::InitFailed(_)) {
            e
        } else {
            ScanError::InitFailed(e.to_string())
        }
    })
}

/// Message handler owning one [`DecodeSession`].
///
/// Requests are handled strictly one at a time, and every request yields
/// exactly one response.
pub struct Worker {
    factory: PrimitiveFactory,
    direct_factory: Option<PrimitiveFactory>,
    enhancer_factory: EnhancerFactory,
    session: Option<DecodeSession>,
    terminated: bool,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("session", &self.session)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(factory: PrimitiveFactory) -> Self {
        Self {
            factory,
            direct_factory: None,
            enhancer_factory: Box::new(Enhancer::new),
            session: None,
            terminated: false,
        }
    }

    /// Worker decoding with [`RqrrDecoder`]; `decode` requests add the region scan
    pub fn rqrr() -> Self {
        Self::new(Box::new(|| {
            Ok(Box::new(RqrrDecoder::new()) as Box<dyn DecodePrimitive>)
        }))
        .with_direct_factory(Box::new(|| {
            Ok(Box::new(RqrrDecoder::with_region_scan()) as Box<dyn DecodePrimitive>)
        }))
    }

    /// Load a separate primitive for `decode` requests on `init`
    pub fn with_direct_factory(mut self, factory: PrimitiveFactory) -> Self {
        self.direct_factory = Some(factory);
        self
    }

    /// Replace the enhancer used by sessions created from now on
    pub fn with_enhancer_factory(mut self, factory: EnhancerFactory) -> Self {
        self.enhancer_factory = factory;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn session(&self) -> Option<&DecodeSession> {
        self.session.as_ref()
    }

    fn session_mut(&mut self) -> ScanResult<&mut DecodeSession> {
        self.session.as_mut().ok_or(ScanError::NotInitialized)
    }

    /// Handle one request
    pub fn handle(&mut self, request: Request) -> Response {
        let Request { id, kind } = request;
        let request_type = kind.request_type();
        match self.dispatch(kind) {
            Ok(body) => Response::ok(id, request_type, body),
            Err(err) => {
                debug!(%id, request = request_type.as_str(), error = %err, "request failed");
                Response::err(id, request_type, err)
            }
        }
    }

    fn dispatch(&mut self, kind: RequestKind) -> ScanResult<ResponseBody> {
        match kind {
            RequestKind::Init { config } => self.init(config),
            RequestKind::UpdateConfig { config, surface } => self.update_config(&config, surface),
            RequestKind::ProcessFrame { frame } => {
                let session = self.session_mut()?;
                if session.surface().is_none() {
                    return Err(ScanError::SurfaceNotReady);
                }
                Ok(ResponseBody::Frame(session.process_frame(&frame)))
            }
            RequestKind::GetPerformanceStats => Ok(ResponseBody::Stats(self.session_mut()?.stats())),
            RequestKind::ResetPerformanceStats => {
                self.session_mut()?.reset_stats();
                Ok(ResponseBody::Ack)
            }
            RequestKind::Decode { frame } => {
                Ok(ResponseBody::Decoded(self.session_mut()?.decode_direct(&frame)))
            }
            RequestKind::ClearBuffer => {
                self.session_mut()?.clear_buffer();
                Ok(ResponseBody::Ack)
            }
            RequestKind::Terminate => {
                self.session = None;
                self.terminated = true;
                info!("worker terminated");
                Ok(ResponseBody::Terminated)
            }
            RequestKind::ParseMrz { text } => Ok(ResponseBody::Mrz(parse_mrz(&text)?)),
        }
    }

    fn init(&mut self, config: Option<ConfigPatch>) -> ScanResult<ResponseBody> {
        if self.session.is_some() {
            return Ok(ResponseBody::Initialized {
                already_initialized: true,
            });
        }
        let mut cfg = ProcessingConfig {
            tuning: crate::config::AdaptiveTuning::from_env(),
            ..Default::default()
        };
        if let Some(patch) = &config {
            cfg.apply(patch)?;
        }
        let primitive = load(&self.factory)?;
        let mut session = DecodeSession::with_enhancer(cfg, primitive, (self.enhancer_factory)())?;
        if let Some(factory) = &self.direct_factory {
            session.set_direct_primitive(load(factory)?);
        }
        self.session = Some(session);
        self.terminated = false;
        info!("decode primitive loaded");
        Ok(ResponseBody::Initialized {
            already_initialized: false,
        })
    }

    fn update_config(
        &mut self,
        patch: &ConfigPatch,
        surface: Option<SurfaceSize>,
    ) -> ScanResult<ResponseBody> {
        let session = self.session_mut()?;
        session.update_config(patch)?;
        if let Some(size) = surface {
            session.set_surface(size.width, size.height)?;
        }
        Ok(ResponseBody::ConfigUpdated {
            config: session.config().clone(),
            surface: session.surface().map(|s| {
                let (width, height) = s.dimensions();
                SurfaceSize { width, height }
            }),
        })
    }

    /// Handle one JSON message.
    ///
    /// Returns `None` only when the message is not JSON or names no known
    /// kind; those are logged and dropped.
    pub fn handle_json(&mut self, text: &str) -> Option<String> {
        let response = match decode_request(text) {
            Decoded::Request(request) => self.handle(request),
            Decoded::Malformed { id, request, error } => Response::err(id, request, error),
            Decoded::Ignored(reason) => {
                warn!(%reason, "ignoring message");
                return None;
            }
        };
        match response.to_json() {
            Ok(json) => Some(json),
            Err(err) => {
                // Fall back to a body-less error so the caller still gets an answer
                warn!(error = %err, "failed to encode response");
                let fallback = Response::err(
                    response.id,
                    response.request,
                    ScanError::Protocol(err.to_string()),
                );
                fallback.to_json().ok()
            }
        }
    }

    /// Serve requests until `terminate` or until the request channel closes
    pub fn run(mut self, requests: Receiver<Request>, responses: Sender<Response>) {
        while let Ok(request) = requests.recv() {
            let terminating = request.kind.request_type() == RequestType::Terminate;
            let response = self.handle(request);
            if responses.send(response).is_err() {
                debug!("response channel closed, stopping worker");
                break;
            }
            if terminating {
                break;
            }
        }
    }
}
