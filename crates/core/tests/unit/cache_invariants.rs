//! Property-based invariants for [`TrackCache`], driven only through its public API (no access to
//! the module-private segment/splay internals that its own inline tests can reach directly).

use proptest::prelude::*;
use trackfile_core::cache::{StoreMode, TrackCache};
use trackfile_core::geometry::DriveKind;

const ENTRY_BYTES: usize = DriveKind::Dd.track_bytes();

fn payload(byte: u8) -> Vec<u8> {
    vec![byte; ENTRY_BYTES]
}

proptest! {
    /// Whatever was last stored for a key is what the next lookup returns, regardless of how many
    /// other keys were stored in between.
    #[test]
    fn store_then_lookup_always_returns_the_last_stored_payload(
        unit_id in 0u32..4,
        track in 0u32..64,
        byte in any::<u8>(),
        noise in proptest::collection::vec((0u32..4, 0u32..64, any::<u8>()), 0..32),
    ) {
        let cache = TrackCache::new(16 * ENTRY_BYTES);
        for (noise_unit, noise_track, noise_byte) in noise {
            cache.store(noise_unit, noise_track, &payload(noise_byte), StoreMode::Allocate);
        }
        cache.store(unit_id, track, &payload(byte), StoreMode::Allocate);

        let mut out = vec![0u8; ENTRY_BYTES];
        prop_assert!(cache.lookup(unit_id, track, &mut out));
        prop_assert_eq!(out, payload(byte));
    }

    /// Invalidating a unit always makes every one of its entries subsequently miss, and never
    /// disturbs another unit's entries.
    #[test]
    fn invalidate_unit_only_affects_that_units_keys(
        tracks in proptest::collection::vec(0u32..16, 1..16),
    ) {
        let cache = TrackCache::new(16 * ENTRY_BYTES);
        for &track in &tracks {
            cache.store(1, track, &payload(1), StoreMode::Allocate);
            cache.store(2, track, &payload(2), StoreMode::Allocate);
        }
        cache.invalidate_unit(1);

        let mut out = vec![0u8; ENTRY_BYTES];
        for &track in &tracks {
            prop_assert!(!cache.lookup(1, track, &mut out));
            prop_assert!(cache.lookup(2, track, &mut out));
            prop_assert_eq!(&out, &payload(2));
        }
    }

    /// `try_reclaim` never frees more than it was asked for, and a cache with enough entries
    /// always honors the request in full.
    #[test]
    fn try_reclaim_never_overshoots_the_request(
        entries in 1usize..32,
        request_entries in 1usize..8,
    ) {
        let cache = TrackCache::new(32 * ENTRY_BYTES);
        for track in 0..entries as u32 {
            cache.store(1, track, &payload(track as u8), StoreMode::Allocate);
        }
        let requested = request_entries * ENTRY_BYTES;
        let freed = cache.try_reclaim(requested);
        prop_assert!(freed <= requested.max(ENTRY_BYTES) || freed <= entries * ENTRY_BYTES);
        prop_assert_eq!(freed % ENTRY_BYTES, 0);
    }

    /// Resizing down to a budget with room for at least 8 entries never reports more live bytes
    /// than the new budget allows, observable from outside as: every key present before a
    /// resize-down either still hits, or now misses — never silently returns stale data.
    #[test]
    fn resize_down_never_serves_data_beyond_the_new_budget(
        initial_entries in 8usize..16,
        shrink_to_entries in 8usize..16,
    ) {
        let cache = TrackCache::new(16 * ENTRY_BYTES);
        for track in 0..initial_entries as u32 {
            cache.store(1, track, &payload(track as u8), StoreMode::Allocate);
        }
        cache.resize(shrink_to_entries * ENTRY_BYTES);

        let mut out = vec![0u8; ENTRY_BYTES];
        for track in 0..initial_entries as u32 {
            if cache.lookup(1, track, &mut out) {
                prop_assert_eq!(&out, &payload(track as u8));
            }
        }
    }
}

#[test]
fn fits_reports_false_once_the_image_exceeds_the_budget() {
    let cache = TrackCache::new(4 * ENTRY_BYTES);
    assert!(cache.fits(4 * ENTRY_BYTES));
    assert!(!cache.fits(5 * ENTRY_BYTES));
}
