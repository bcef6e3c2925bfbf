//! Guard-level scenarios for the buffer pool.
//!
//! Page ids come straight from the disk manager, so every page enters the
//! pool through a fetch rather than through `create_page`. The scenarios
//! are modeled on the BusTub buffer pool and page guard suites.

use pagecore::{BufferPoolManager, DiskManager, ErrorKind, PageId};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

const FRAMES: usize = 10;

fn pool(frames: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let dm = Arc::new(DiskManager::create(dir.path().join("guards.db")).unwrap());
    (BufferPoolManager::new(frames, dm), dir)
}

fn on_disk(bpm: &BufferPoolManager) -> PageId {
    bpm.disk_manager().allocate_page().unwrap()
}

/// Store a length-prefixed label at the start of the payload.
fn put_label(data: &mut [u8], label: &str) {
    data[0] = label.len() as u8;
    data[1..=label.len()].copy_from_slice(label.as_bytes());
}

fn label(data: &[u8]) -> &str {
    let len = data[0] as usize;
    std::str::from_utf8(&data[1..=len]).unwrap()
}

/// Write, read twice, delete.
#[test]
fn test_write_then_read_back() {
    let (bpm, _dir) = pool(FRAMES);
    let pid = on_disk(&bpm);

    {
        let mut guard = bpm.fetch_page_write(pid).unwrap();
        put_label(guard.data_mut(), "Hello, world!");
        assert_eq!(label(guard.data()), "Hello, world!");
    }
    for _ in 0..2 {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(label(guard.data()), "Hello, world!");
    }

    bpm.delete_page(pid).unwrap();
    assert!(!bpm.contains_page(pid));
}

/// Two frames, both pinned: other pages are refused until a guard goes.
/// Once both are evicted, their edits come back from disk.
#[test]
fn test_two_frames_pin_and_reload() {
    let (bpm, _dir) = pool(2);
    let pages = [on_disk(&bpm), on_disk(&bpm)];
    let outsiders = [on_disk(&bpm), on_disk(&bpm)];

    {
        let mut guards: Vec<_> = pages
            .iter()
            .map(|&pid| bpm.fetch_page_write(pid).unwrap())
            .collect();
        for (i, guard) in guards.iter_mut().enumerate() {
            put_label(guard.data_mut(), &format!("page{}", i));
        }

        let err = bpm.fetch_page_read(outsiders[0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(bpm.fetch_page_write(outsiders[1]).is_err());

        for (guard, &pid) in guards.drain(..).zip(&pages) {
            assert_eq!(bpm.pin_count(pid), Some(1));
            guard.drop_guard();
            assert_eq!(bpm.pin_count(pid), Some(0));
        }
    }

    bpm.fetch_page_read(outsiders[0]).unwrap().drop_guard();
    bpm.fetch_page_write(outsiders[1]).unwrap().drop_guard();
    assert!(pages.iter().all(|&pid| bpm.pin_count(pid).is_none()));

    for (i, &pid) in pages.iter().enumerate() {
        let mut guard = bpm.fetch_page_write(pid).unwrap();
        assert_eq!(label(guard.data()), format!("page{}", i));
        put_label(guard.data_mut(), &format!("page{}updated", i));
    }

    let readers: Vec<_> = pages
        .iter()
        .map(|&pid| bpm.fetch_page_read(pid).unwrap())
        .collect();
    for (i, reader) in readers.iter().enumerate() {
        assert_eq!(label(reader.data()), format!("page{}updated", i));
        assert_eq!(bpm.pin_count(reader.page_id()), Some(1));
    }
    drop(readers);
    assert!(pages.iter().all(|&pid| bpm.pin_count(pid) == Some(0)));
}

/// Fill the pool with pinned pages, release half, and check which fetches
/// succeed as frames come and go.
#[test]
fn test_fill_release_refill() {
    let (bpm, _dir) = pool(FRAMES);

    let first = on_disk(&bpm);
    {
        let mut guard = bpm.fetch_page_write(first).unwrap();
        put_label(guard.data_mut(), "Hello");
    }

    let mut held: Vec<_> = (0..FRAMES)
        .map(|_| bpm.fetch_page_write(on_disk(&bpm)).unwrap())
        .collect();
    assert!(held.iter().all(|g| bpm.pin_count(g.page_id()) == Some(1)));

    for _ in 0..FRAMES {
        assert!(bpm.fetch_page_write(on_disk(&bpm)).is_err());
    }

    let released: Vec<PageId> = held.drain(..FRAMES / 2).map(|g| g.page_id()).collect();
    assert!(released.iter().all(|&pid| bpm.pin_count(pid) == Some(0)));
    assert!(held.iter().all(|g| bpm.pin_count(g.page_id()) == Some(1)));

    // Leave exactly one frame unpinned
    for _ in 0..FRAMES / 2 - 1 {
        held.push(bpm.fetch_page_write(on_disk(&bpm)).unwrap());
    }

    assert_eq!(label(bpm.fetch_page_read(first).unwrap().data()), "Hello");

    // The last frame is taken, so the first page can't come back
    let last = bpm.fetch_page_read(on_disk(&bpm)).unwrap();
    assert!(bpm.fetch_page_read(first).is_err());
    drop(last);
}

/// Guards release their pins on drop and leave the page unlocked.
#[test]
fn test_guards_unpin_and_unlock() {
    let (bpm, _dir) = pool(FRAMES);

    let pid = on_disk(&bpm);
    let guard = bpm.fetch_page_write(pid).unwrap();
    assert_eq!(bpm.pin_count(pid), Some(1));
    guard.drop_guard();
    assert_eq!(bpm.pin_count(pid), Some(0));

    let (a, b) = (on_disk(&bpm), on_disk(&bpm));
    let reader = bpm.fetch_page_read(a).unwrap();
    let writer = bpm.fetch_page_write(b).unwrap();
    assert_eq!((bpm.pin_count(a), bpm.pin_count(b)), (Some(1), Some(1)));
    reader.drop_guard();
    writer.drop_guard();
    assert_eq!((bpm.pin_count(a), bpm.pin_count(b)), (Some(0), Some(0)));

    // Would block forever if either lock had leaked
    let both = (
        bpm.fetch_page_write(a).unwrap(),
        bpm.fetch_page_write(b).unwrap(),
    );
    drop(both);

    let guards: Vec<_> = (0..FRAMES)
        .map(|_| bpm.fetch_page_write(on_disk(&bpm)).unwrap())
        .collect();
    let batch: Vec<PageId> = guards.iter().map(|g| g.page_id()).collect();
    drop(guards);
    assert!(batch.iter().all(|&pid| bpm.pin_count(pid) == Some(0)));

    let edited = on_disk(&bpm);
    {
        let mut guard = bpm.fetch_page_write(edited).unwrap();
        put_label(guard.data_mut(), "data");
    }

    // A second full batch pushes the edited page out
    {
        let _guards: Vec<_> = (0..FRAMES)
            .map(|_| bpm.fetch_page_write(on_disk(&bpm)).unwrap())
            .collect();
        assert!(!bpm.contains_page(edited));
    }

    assert_eq!(label(bpm.fetch_page_read(edited).unwrap().data()), "data");
}

/// With one frame, a page held by one thread can never be displaced by
/// another thread's fetch.
#[test]
fn test_pinned_frame_is_never_evicted() {
    use std::sync::Barrier;

    const ROUNDS: usize = 50;
    const READERS: usize = 4;

    let (bpm, _dir) = pool(1);
    let bpm = Arc::new(bpm);

    for round in 0..ROUNDS {
        let held = on_disk(&bpm);
        let other = on_disk(&bpm);
        bpm.fetch_page_write(held).unwrap().drop_guard();
        bpm.fetch_page_write(other).unwrap().drop_guard();

        let barrier = Arc::new(Barrier::new(READERS + 1));
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let bpm = Arc::clone(&bpm);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let _shared = bpm.fetch_page_read(held).unwrap();
                    assert!(
                        bpm.fetch_page_read(other).is_err(),
                        "round {}: fetched {} while {} was pinned",
                        round,
                        other,
                        held
                    );
                })
            })
            .collect();

        let main_guard = bpm.fetch_page_read(held).unwrap();
        barrier.wait();
        for reader in readers {
            reader.join().unwrap();
        }
        drop(main_guard);
    }
}

/// Taking a second page's write lock while a thread waits on the first
/// doesn't deadlock.
#[test]
fn test_lock_second_page_while_other_thread_waits() {
    use std::sync::mpsc;
    use std::time::Duration;

    let (bpm, _dir) = pool(FRAMES);
    let bpm = Arc::new(bpm);
    let (p0, p1) = (on_disk(&bpm), on_disk(&bpm));

    let guard0 = bpm.fetch_page_write(p0).unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let waiter = {
        let bpm = Arc::clone(&bpm);
        thread::spawn(move || {
            started_tx.send(()).unwrap();
            let _guard = bpm.fetch_page_write(p0).unwrap();
        })
    };
    started_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(100));

    let _guard1 = bpm.fetch_page_write(p1).unwrap();
    guard0.drop_guard();

    waiter.join().unwrap();
    assert_eq!(bpm.pin_count(p0), Some(0));
}

/// `create_page` allocates, pins and write-locks in one call.
#[test]
fn test_create_page_allocates_and_pins() {
    let (bpm, _dir) = pool(FRAMES);

    let pid = {
        let mut guard = bpm.create_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(bpm.pin_count(guard.page_id()), Some(1));
        put_label(guard.data_mut(), "fresh");
        guard.page_id()
    };
    assert_eq!(bpm.disk_manager().num_pages(), 1);

    assert_eq!(label(bpm.fetch_page_read(pid).unwrap().data()), "fresh");

    bpm.delete_page(pid).unwrap();
    assert!(!bpm.contains_page(pid));
}
