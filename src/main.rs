//! Stress driver for `axiom-mtlist`.
//!
//! Spawns the requested number of threads, each performing a fixed sequence of
//! random actions on one shared list: linking fresh boxed elements at the front
//! or back, popping and freeing, and walking with a cursor that randomly frees
//! elements and randomly stops early.
//!
//! ```text
//! mtlist-stress <nb_threads>
//! RUST_LOG=debug mtlist-stress 4
//! ```

use std::error::Error;
use std::ptr::NonNull;
use std::{env, process, thread};

use axiom_mtlist::{mt_list_entry, MtList};
use log::{debug, error, info, LevelFilter};
use nanorand::{Rng, WyRand};
use simple_logger::SimpleLogger;

/// Actions performed by each thread.
const MAX_ACTION: usize = 2_000_000;

/// Fixed seed so runs are reproducible; offset by the thread number.
const SEED: u64 = 2_463_534_242;

static LIST: MtList = MtList::new();

struct Elem {
    id: u64,
    link: MtList,
}

fn alloc(id: u64) -> NonNull<MtList> {
    let elem = Box::leak(Box::new(Elem {
        id,
        link: MtList::new(),
    }));
    NonNull::from(&elem.link)
}

/// Frees an element previously leaked by [`alloc`].
///
/// # Safety
///
/// `link` must be the detached `link` of an element from [`alloc`], and no
/// other thread may still reach it.
unsafe fn free(link: NonNull<MtList>) {
    let elem = unsafe { mt_list_entry!(link, Elem, link) };
    drop(unsafe { Box::from_raw(elem.as_ptr()) });
}

fn worker(tid: u64) -> u64 {
    let mut rng = WyRand::new_seed(SEED + tid);
    let mut next_id = tid << 48;
    let mut freed = 0;

    for i in 0..MAX_ACTION {
        match rng.generate_range(0u32..4) {
            0 | 1 => {
                let link = alloc(next_id);
                next_id += 1;
                // SAFETY: `link` is leaked and only freed once detached.
                let linked = unsafe {
                    if rng.generate_range(0u32..2) == 0 {
                        LIST.try_insert(link)
                    } else {
                        LIST.try_append(link)
                    }
                };
                debug_assert!(linked, "a fresh element is never already linked");
            }
            2 => {
                if let Some(link) = LIST.pop() {
                    // SAFETY: popped elements are detached and ours alone.
                    unsafe { free(link) };
                    freed += 1;
                }
            }
            _ => {
                let mut cursor = LIST.cursor();
                while let Some(link) = cursor.next() {
                    if rng.generate_range(0u32..2) == 0 {
                        let removed = cursor.remove();
                        debug_assert_eq!(removed, Some(link));
                        // SAFETY: removed by the cursor, which never touches it again.
                        unsafe { free(link) };
                        freed += 1;
                    }
                    if rng.generate_range(0u32..2) == 0 {
                        break;
                    }
                }
            }
        }

        if i / (MAX_ACTION / 10) != (i + 1) / (MAX_ACTION / 10) {
            info!("{}: {}", tid, i + 1);
        }
    }

    debug!("thread {} allocated {} and freed {}", tid, next_id - (tid << 48), freed);
    freed
}

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;

    let nb: u64 = match env::args().nth(1).map(|arg| arg.parse()) {
        Some(Ok(nb)) if nb > 0 => nb,
        _ => {
            error!("Usage: mtlist-stress <nb_threads>");
            process::exit(1);
        }
    };

    info!("Starting mt_list stress test with {} threads...", nb);

    let threads: Vec<_> = (0..nb)
        .map(|tid| thread::Builder::new().name(format!("worker-{tid}")).spawn(move || worker(tid)))
        .collect::<Result<_, _>>()?;

    let mut freed = 0;
    for t in threads {
        freed += t.join().map_err(|_| "worker thread panicked")?;
    }

    let mut left = 0;
    while let Some(link) = LIST.pop() {
        // SAFETY: all workers are done; popped elements are ours alone.
        let id = unsafe { mt_list_entry!(link, Elem, link).as_ref() }.id;
        debug!("draining element {:#x}", id);
        unsafe { free(link) };
        left += 1;
    }

    info!("Freed {} elements during the run, {} left at the end", freed, left);
    Ok(())
}
