use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{ApiClient, VideoEntry};
use crate::app::Msg;

/// Fetches cover URLs for an episode list in the background, one request at
/// a time with a fixed pause between requests, so a long list never floods
/// the server.
#[derive(Clone)]
pub struct CoverPrefetcher {
    api: ApiClient,
    interval: Duration,
}

impl CoverPrefetcher {
    pub fn new(api: ApiClient, interval: Duration) -> Self {
        Self { api, interval }
    }

    /// Walk the list in order and send one `CoverLoaded` per cover found.
    ///
    /// `epoch` identifies the list this run belongs to. The run stops as
    /// soon as `live_epoch` moves past it, so navigating away stops the
    /// requests themselves, not just their application. Episodes without a
    /// `bvid` have no cover and are skipped; so is any episode whose fetch
    /// fails, without ending the run.
    pub fn run(
        &self,
        videos: Vec<VideoEntry>,
        epoch: u64,
        live_epoch: Arc<AtomicU64>,
        tx: mpsc::Sender<Msg>,
    ) -> JoinHandle<()> {
        let api = self.api.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut issued = false;

            for video in videos {
                let Some(bvid) = video.bvid else {
                    continue;
                };

                if issued {
                    tokio::time::sleep(interval).await;
                }
                issued = true;

                if live_epoch.load(Ordering::Relaxed) != epoch {
                    debug!(epoch, "episode list changed, stopping cover prefetch");
                    return;
                }

                match api.get_cover(&bvid, video.page).await {
                    Ok(info) => {
                        let Some(url) = info.url() else {
                            debug!(bvid = %bvid, page = video.page, "no cover available");
                            continue;
                        };

                        let msg = Msg::CoverLoaded {
                            epoch,
                            page: video.page,
                            cover_url: api.absolute_url(url),
                        };
                        if tx.send(msg).await.is_err() {
                            return; // UI is gone
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, bvid = %bvid, page = video.page, "cover fetch failed, skipping");
                    }
                }
            }
        })
    }
}
