use std::sync::Mutex;

/// Transient feedback shown on top of the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Ok,
    Alert,
}

/// The physical button or dial a [`Button`](super::Button) draws on.
///
/// Implemented by whatever drives the hardware; the CLI prints to the
/// terminal instead.
pub trait ButtonSurface: Send + Sync {
    fn set_title(&self, title: &str);
    fn show_indicator(&self, indicator: Indicator);
}

/// Something drawn on a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceUpdate {
    Title(String),
    Indicator(Indicator),
}

/// A surface that remembers every update, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    updates: Mutex<Vec<SurfaceUpdate>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<SurfaceUpdate> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    /// The most recent title, if any was set.
    pub fn last_title(&self) -> Option<String> {
        self.updates().into_iter().rev().find_map(|u| match u {
            SurfaceUpdate::Title(t) => Some(t),
            SurfaceUpdate::Indicator(_) => None,
        })
    }

    pub fn last_indicator(&self) -> Option<Indicator> {
        self.updates().into_iter().rev().find_map(|u| match u {
            SurfaceUpdate::Indicator(i) => Some(i),
            SurfaceUpdate::Title(_) => None,
        })
    }

    fn push(&self, update: SurfaceUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }
}

impl ButtonSurface for RecordingSurface {
    fn set_title(&self, title: &str) {
        self.push(SurfaceUpdate::Title(title.to_owned()));
    }

    fn show_indicator(&self, indicator: Indicator) {
        self.push(SurfaceUpdate::Indicator(indicator));
    }
}
