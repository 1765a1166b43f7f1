pub trait PhaseNotifier: Send + Sync {
    fn play_focus_complete(&self);
    fn play_break_complete(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl PhaseNotifier for LogNotifier {
    fn play_focus_complete(&self) {
        log::info!("focus phase complete");
    }

    fn play_break_complete(&self) {
        log::info!("break phase complete");
    }
}
