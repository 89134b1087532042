//! Drives a [`FilterChain`] to completion against a storage engine,
//! committing segments into an [`Object`] and keeping a [`BusyObject`]'s
//! streaming cursor in sync (spec §4.5 "Pipeline"/"Streaming
//! visibility"), grounded on `cache_fetch_proc.c`'s `VFP_Fetch_Body`.

use std::sync::Arc;

use objcache_backend::Stevedore;
use objcache_core::{CoreError, Object};

use crate::busy::{BusyObject, DoClose};
use crate::filter::{FilterChain, FilterError};

/// Runs `chain` to completion, allocating segments from `engine` in
/// `chunk_size`-sized pieces and appending them to `object`, extending
/// `busy`'s visible length as each chunk commits.
///
/// On success, `busy` is left in `FINISHED` state. On any failure
/// (pipeline error or storage exhaustion), `busy` is left in `FAILED`
/// with a `DoClose` reason recorded, and an error is returned; any
/// segments already pushed onto `object` remain there for the caller to
/// free via normal `Object` drop.
pub fn run_fetch(
    chain: &mut FilterChain,
    busy: &BusyObject,
    engine: &dyn Stevedore,
    object: &mut Object,
    chunk_size: usize,
) -> Result<(), CoreError> {
    if let Err(e) = chain.open() {
        busy.fail(DoClose::FetchFailed);
        return Err(pipeline_error(e));
    }
    busy.begin_fetch();

    let result = pump(chain, busy, engine, object, chunk_size);
    chain.close();

    match &result {
        Ok(()) => busy.finish(),
        Err(CoreError::OutOfStorage { .. }) => busy.fail(DoClose::OutOfStorage),
        Err(_) => busy.fail(DoClose::FetchFailed),
    }
    result
}

fn pump(
    chain: &mut FilterChain,
    busy: &BusyObject,
    engine: &dyn Stevedore,
    object: &mut Object,
    chunk_size: usize,
) -> Result<(), CoreError> {
    let mut segment = Arc::new(engine.alloc(chunk_size).ok_or_else(|| CoreError::OutOfStorage {
        engine: engine.name().to_string(),
    })?);
    busy.push_segment(Arc::clone(&segment));

    loop {
        if segment.len() == segment.space() {
            object.push_segment(segment);
            segment = Arc::new(engine.alloc(chunk_size).ok_or_else(|| CoreError::OutOfStorage {
                engine: engine.name().to_string(),
            })?);
            busy.push_segment(Arc::clone(&segment));
        }

        match chain.pull(segment.uncommitted_mut()).map_err(pipeline_error)? {
            crate::filter::Pulled::Ok(n) => {
                segment.commit(n);
                engine.store().gauges.record_commit(n);
                busy.extend(n as u64);
            }
            crate::filter::Pulled::End(n) => {
                segment.commit(n);
                engine.store().gauges.record_commit(n);
                busy.extend(n as u64);
                object.push_segment(segment);
                return Ok(());
            }
        }
    }
}

fn pipeline_error(e: FilterError) -> CoreError {
    CoreError::FetchError(Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Source;
    use crate::filters::Identity;
    use http::HeaderMap;
    use objcache_storage_malloc::MallocEngine;
    use std::io::Cursor;

    #[test]
    fn successful_fetch_commits_segments_and_finishes_busy() {
        let engine = MallocEngine::new("malloc", None);
        let busy = BusyObject::new();
        let mut object = Object::new(1, HeaderMap::new());
        let mut chain = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(b"hello world".to_vec()))),
            Box::new(Identity),
        ]);

        run_fetch(&mut chain, &busy, engine.as_ref(), &mut object, 4).unwrap();

        assert_eq!(object.body_len(), 11);
        assert_eq!(busy.len(), 11);
        assert_eq!(busy.state(), crate::busy::FetchState::Finished);
    }

    #[test]
    fn storage_exhaustion_fails_busy_with_out_of_storage() {
        let engine = MallocEngine::new("malloc", Some(1));
        let busy = BusyObject::new();
        let mut object = Object::new(1, HeaderMap::new());
        let mut chain = FilterChain::new(vec![
            Box::new(Source::new(Cursor::new(b"too much data".to_vec()))),
            Box::new(Identity),
        ]);

        let err = run_fetch(&mut chain, &busy, engine.as_ref(), &mut object, 64).unwrap_err();
        assert!(matches!(err, CoreError::OutOfStorage { .. }));
        assert_eq!(busy.doclose(), DoClose::OutOfStorage);
    }
}
