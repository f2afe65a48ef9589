mod enricher;
mod listener;
mod poller;
mod processor;
mod state;
mod storage_fetcher;
mod subscriber;

pub use enricher::enrich;
pub use listener::{Listener, ListenerHandle, ListenerOptions, resolve_offline_range};
pub use poller::{DEFAULT_MAX_BATCH_SIZE, Poller};
pub use processor::{DEFAULT_ENRICH_CONCURRENCY, Processor};
pub use storage_fetcher::StorageFetcher;
pub use subscriber::Subscriber;
