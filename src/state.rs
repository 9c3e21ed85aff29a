use crate::blocklist::Blocklist;
use crate::recorder::RequestRecorder;
// app's shared state

pub struct AppState {
    pub blocklist: Blocklist,       // consulted before anything else
    pub recorder: RequestRecorder,  // per-IP request logs
}

impl AppState {
    pub fn new(blocklist: Blocklist, recorder: RequestRecorder) -> Self {
        Self { blocklist, recorder }
    }
}
