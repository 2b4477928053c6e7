use std::sync::Arc;

use classcast_capture_engine::synthetic::{SyntheticDevices, SyntheticEncoderFactory};
use classcast_capture_engine::{CaptureRequest, CaptureSessionManager};
use classcast_common::config::CaptureDefaults;
use proptest::prelude::*;

fn record(chunks: &[Vec<u8>]) -> (Vec<u8>, usize) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let devices = Arc::new(SyntheticDevices::new());
        let encoders = Arc::new(SyntheticEncoderFactory::new().with_tail(Vec::new()));
        let mut manager =
            CaptureSessionManager::new(devices, encoders.clone(), CaptureDefaults::default());

        manager.start(CaptureRequest::Audio).await.expect("start");
        let encoder = encoders.last_encoder().expect("encoder");
        for chunk in chunks {
            encoder.emit(chunk.clone());
        }
        let artifact = manager.stop().await.expect("artifact");
        let count = artifact.chunk_count();
        (artifact.into_bytes(), count)
    })
}

proptest! {
    #[test]
    fn artifact_is_ordered_concatenation_of_non_empty_chunks(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 0..24)
    ) {
        let (bytes, count) = record(&chunks);

        let expected: Vec<u8> = chunks.iter().flatten().copied().collect();
        let non_empty = chunks.iter().filter(|c| !c.is_empty()).count();

        prop_assert_eq!(bytes, expected);
        prop_assert_eq!(count, non_empty);
    }
}
