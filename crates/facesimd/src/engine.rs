use facesim_core::{FaceVerifier, VerifyError, VerifyOutput, VerifyRequest};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A verification job sent from HTTP handlers to the engine thread.
struct EngineRequest {
    request: VerifyRequest,
    reply: oneshot::Sender<Result<VerifyOutput, VerifyError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Queue a verification and wait for its result.
    ///
    /// Dropping the returned future abandons the reply; the engine still
    /// finishes the job but its result is discarded.
    pub async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutput, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The verifier holds ONNX sessions that need exclusive access, so requests
/// are serialized through a bounded queue of `queue_depth` entries.
pub fn spawn_engine<V>(mut verifier: V, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    V: FaceVerifier + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("facesim-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(EngineRequest { request, reply }) = rx.blocking_recv() {
                if reply.is_closed() {
                    tracing::debug!("caller went away before verification started; skipping");
                    continue;
                }
                let started = Instant::now();
                let result = panic::catch_unwind(AssertUnwindSafe(|| verifier.verify(&request)))
                    .unwrap_or_else(|payload| {
                        let msg = panic_message(payload.as_ref());
                        tracing::error!(model = %request.model, panic = %msg, "verifier panicked");
                        Err(VerifyError::Inference(format!("verifier panicked: {msg}")))
                    });
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &result {
                    Ok(out) => tracing::info!(
                        model = %request.model,
                        distance = out.distance,
                        elapsed_ms,
                        "verification complete"
                    ),
                    Err(e) => tracing::warn!(
                        model = %request.model,
                        error = %e,
                        elapsed_ms,
                        "verification failed"
                    ),
                }
                let _ = reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use facesim_core::ModelName;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Canned outcomes keyed by model, recording every request it sees.
    #[derive(Clone, Default)]
    pub(crate) struct StubVerifier {
        pub distances: HashMap<ModelName, f64>,
        pub fail_with_no_face: bool,
        pub seen: Arc<Mutex<Vec<SeenRequest>>>,
    }

    /// What the stub observed about one request.
    #[derive(Debug, Clone)]
    pub(crate) struct SeenRequest {
        pub model: ModelName,
        pub metric: facesim_core::DistanceMetric,
        pub enforce_detection: bool,
        pub paths: [PathBuf; 2],
        /// File contents at call time; staging must have written them.
        pub contents: [Vec<u8>; 2],
    }

    impl StubVerifier {
        pub(crate) fn with_distance(model: ModelName, distance: f64) -> Self {
            let mut stub = Self::default();
            stub.distances.insert(model, distance);
            stub
        }
    }

    impl FaceVerifier for StubVerifier {
        fn verify(&mut self, req: &VerifyRequest) -> Result<VerifyOutput, VerifyError> {
            let read = |p: &PathBuf| std::fs::read(p).unwrap_or_default();
            self.seen.lock().unwrap().push(SeenRequest {
                model: req.model,
                metric: req.metric,
                enforce_detection: req.enforce_detection,
                paths: [req.img1_path.clone(), req.img2_path.clone()],
                contents: [read(&req.img1_path), read(&req.img2_path)],
            });
            if self.fail_with_no_face {
                return Err(VerifyError::NoFaceDetected { image: 1 });
            }
            let distance = self.distances.get(&req.model).copied().ok_or_else(|| {
                VerifyError::ModelLoadFailure {
                    model: req.model.to_string(),
                    reason: "not stubbed".into(),
                }
            })?;
            Ok(VerifyOutput {
                distance,
                model: req.model,
                metric: req.metric,
                facial_areas: [None, None],
            })
        }
    }

    /// Panics on its first call, then succeeds.
    pub(crate) struct PanicOnce {
        pub calls: usize,
        pub distance: f64,
    }

    impl FaceVerifier for PanicOnce {
        fn verify(&mut self, req: &VerifyRequest) -> Result<VerifyOutput, VerifyError> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("onnx session blew up");
            }
            Ok(VerifyOutput {
                distance: self.distance,
                model: req.model,
                metric: req.metric,
                facial_areas: [None, None],
            })
        }
    }

    #[tokio::test]
    async fn test_engine_survives_verifier_panic() {
        let handle = spawn_engine(PanicOnce { calls: 0, distance: 0.1 }, 1).unwrap();
        let err = handle
            .verify(VerifyRequest::new("a", "b", ModelName::VggFace))
            .await
            .unwrap_err();
        match err {
            EngineError::Verify(VerifyError::Inference(msg)) => {
                assert!(msg.contains("onnx session blew up"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let out = handle
            .verify(VerifyRequest::new("a", "b", ModelName::VggFace))
            .await
            .unwrap();
        assert_eq!(out.distance, 0.1);
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }

    #[tokio::test]
    async fn test_engine_round_trip() {
        let stub = StubVerifier::with_distance(ModelName::ArcFace, 0.2);
        let handle = spawn_engine(stub, 2).unwrap();
        let out = handle
            .verify(VerifyRequest::new("a", "b", ModelName::ArcFace))
            .await
            .unwrap();
        assert_eq!(out.distance, 0.2);
    }

    #[tokio::test]
    async fn test_engine_propagates_verifier_error() {
        let stub = StubVerifier {
            fail_with_no_face: true,
            ..Default::default()
        };
        let handle = spawn_engine(stub, 1).unwrap();
        let err = handle
            .verify(VerifyRequest::new("a", "b", ModelName::VggFace))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Verify(VerifyError::NoFaceDetected { image: 1 })
        ));
    }

    #[tokio::test]
    async fn test_engine_serves_concurrent_callers() {
        let stub = StubVerifier::with_distance(ModelName::Facenet, 0.5);
        let seen = stub.seen.clone();
        let handle = spawn_engine(stub, 1).unwrap();

        let calls = (0..5).map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle
                    .verify(VerifyRequest::new("a", "b", ModelName::Facenet))
                    .await
            })
        });
        for call in calls.collect::<Vec<_>>() {
            assert_eq!(call.await.unwrap().unwrap().distance, 0.5);
        }
        assert_eq!(seen.lock().unwrap().len(), 5);
    }
}
