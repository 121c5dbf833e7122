//! Area selection
//!
//! A pure drag state machine (`Idle -> Dragging -> Finalized | Cancelled`)
//! and an async driver that feeds it pointer input from whatever surface the
//! platform provides. The state machine itself never touches a UI.

use crate::capture::geometry::{Rectangle, Resolution};
use crate::config::SelectionConfig;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a selection did not produce a rectangle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Selection too small. Please select a larger area.")]
    TooSmall { width: f64, height: f64 },

    #[error("Cancelled")]
    Cancelled,
}

/// Reject a rectangle below the configured minimum size. Never clamps.
pub fn check_minimum_size(rect: &Rectangle, config: &SelectionConfig) -> Result<(), SelectionError> {
    if rect.width < config.min_width as f64 || rect.height < config.min_height as f64 {
        return Err(SelectionError::TooSmall {
            width: rect.width,
            height: rect.height,
        });
    }
    Ok(())
}

/// Pointer input in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up { x: f64, y: f64 },
    /// Explicit cancel, e.g. the escape key
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorState {
    Idle,
    Dragging { anchor: (f64, f64), candidate: Rectangle },
    Finalized(Rectangle),
    Cancelled(SelectionError),
}

impl SelectorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SelectorState::Finalized(_) | SelectorState::Cancelled(_))
    }
}

/// Rectangle-drag state machine
#[derive(Debug, Clone)]
pub struct AreaSelector {
    state: SelectorState,
    surface: Resolution,
    limits: SelectionConfig,
}

impl AreaSelector {
    pub fn new(surface: Resolution, config: &SelectionConfig) -> Self {
        Self {
            state: SelectorState::Idle,
            surface,
            limits: config.clone(),
        }
    }

    pub fn state(&self) -> &SelectorState {
        &self.state
    }

    /// The rectangle currently being dragged out, for drawing feedback
    pub fn candidate(&self) -> Option<Rectangle> {
        match &self.state {
            SelectorState::Dragging { candidate, .. } => Some(*candidate),
            _ => None,
        }
    }

    /// Terminal result, once reached
    pub fn outcome(&self) -> Option<Result<Rectangle, SelectionError>> {
        match &self.state {
            SelectorState::Finalized(rect) => Some(Ok(*rect)),
            SelectorState::Cancelled(err) => Some(Err(err.clone())),
            _ => None,
        }
    }

    /// Apply one input. Input after a terminal state is ignored.
    pub fn handle(&mut self, input: PointerInput) -> &SelectorState {
        let next = match (&self.state, input) {
            (state, _) if state.is_terminal() => None,

            (_, PointerInput::Cancel) => Some(SelectorState::Cancelled(SelectionError::Cancelled)),

            (SelectorState::Idle, PointerInput::Down { x, y }) => {
                if self.surface.as_rect().contains(x, y) {
                    Some(SelectorState::Dragging {
                        anchor: (x, y),
                        candidate: Rectangle::new(x, y, 0.0, 0.0),
                    })
                } else {
                    None
                }
            }

            (SelectorState::Dragging { anchor, .. }, PointerInput::Move { x, y }) => {
                Some(SelectorState::Dragging {
                    anchor: *anchor,
                    candidate: Rectangle::from_corners(anchor.0, anchor.1, x, y),
                })
            }

            (SelectorState::Dragging { anchor, .. }, PointerInput::Up { x, y }) => {
                let rect = Rectangle::from_corners(anchor.0, anchor.1, x, y);
                match check_minimum_size(&rect, &self.limits) {
                    Ok(()) => Some(SelectorState::Finalized(rect)),
                    Err(e) => Some(SelectorState::Cancelled(e)),
                }
            }

            _ => None,
        };

        if let Some(next) = next {
            self.state = next;
        }
        &self.state
    }
}

/// Run a selection to completion from a stream of pointer input.
///
/// The receiver is dropped on return, which releases the input binding on
/// both terminal transitions. A closed input stream counts as a cancel.
pub async fn select_area(
    mut inputs: mpsc::Receiver<PointerInput>,
    surface: Resolution,
    config: &SelectionConfig,
) -> Result<Rectangle, SelectionError> {
    let mut selector = AreaSelector::new(surface, config);

    while let Some(input) = inputs.recv().await {
        selector.handle(input);
        if let Some(outcome) = selector.outcome() {
            match &outcome {
                Ok(rect) => tracing::info!(
                    "Area selected: {}x{} at ({}, {})",
                    rect.width,
                    rect.height,
                    rect.x,
                    rect.y
                ),
                Err(e) => tracing::info!("Area selection ended: {}", e),
            }
            return outcome;
        }
    }

    tracing::info!("Area selection input closed before completion");
    Err(SelectionError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> AreaSelector {
        AreaSelector::new(Resolution::new(1280, 720), &SelectionConfig::default())
    }

    fn drag(sel: &mut AreaSelector, from: (f64, f64), to: (f64, f64)) {
        sel.handle(PointerInput::Down { x: from.0, y: from.1 });
        sel.handle(PointerInput::Move { x: to.0, y: to.1 });
        sel.handle(PointerInput::Up { x: to.0, y: to.1 });
    }

    #[test]
    fn test_valid_drag_finalizes() {
        let mut sel = selector();
        drag(&mut sel, (100.0, 100.0), (400.0, 300.0));
        assert_eq!(
            sel.outcome(),
            Some(Ok(Rectangle::new(100.0, 100.0, 300.0, 200.0)))
        );
    }

    #[test]
    fn test_exact_minimum_is_accepted() {
        let mut sel = selector();
        drag(&mut sel, (10.0, 10.0), (60.0, 60.0));
        assert!(matches!(sel.outcome(), Some(Ok(_))));
    }

    #[test]
    fn test_small_drag_is_rejected_not_clamped() {
        for (w, h) in [(40.0, 40.0), (49.0, 300.0), (300.0, 49.9)] {
            let mut sel = selector();
            drag(&mut sel, (100.0, 100.0), (100.0 + w, 100.0 + h));
            assert!(
                matches!(sel.outcome(), Some(Err(SelectionError::TooSmall { .. }))),
                "{}x{} should be too small",
                w,
                h
            );
        }
    }

    #[test]
    fn test_minimum_size_check_uses_configured_limits() {
        let config = SelectionConfig {
            min_width: 100,
            min_height: 20,
        };
        assert_eq!(
            check_minimum_size(&Rectangle::new(0.0, 0.0, 99.5, 300.0), &config),
            Err(SelectionError::TooSmall {
                width: 99.5,
                height: 300.0
            })
        );
        assert!(check_minimum_size(&Rectangle::new(0.0, 0.0, 100.0, 20.0), &config).is_ok());
    }

    #[test]
    fn test_reverse_drag_flips_anchor() {
        let mut sel = selector();
        sel.handle(PointerInput::Down { x: 500.0, y: 400.0 });
        sel.handle(PointerInput::Move { x: 200.0, y: 100.0 });
        assert_eq!(
            sel.candidate(),
            Some(Rectangle::new(200.0, 100.0, 300.0, 300.0))
        );
    }

    #[test]
    fn test_cancel_during_drag() {
        let mut sel = selector();
        sel.handle(PointerInput::Down { x: 10.0, y: 10.0 });
        sel.handle(PointerInput::Move { x: 300.0, y: 300.0 });
        sel.handle(PointerInput::Cancel);
        assert_eq!(sel.outcome(), Some(Err(SelectionError::Cancelled)));
    }

    #[test]
    fn test_terminal_state_ignores_input() {
        let mut sel = selector();
        drag(&mut sel, (0.0, 0.0), (100.0, 100.0));
        sel.handle(PointerInput::Cancel);
        sel.handle(PointerInput::Down { x: 1.0, y: 1.0 });
        assert!(matches!(sel.state(), SelectorState::Finalized(_)));
    }

    #[test]
    fn test_down_outside_surface_is_ignored() {
        let mut sel = selector();
        sel.handle(PointerInput::Down { x: 5000.0, y: 10.0 });
        assert_eq!(sel.state(), &SelectorState::Idle);
    }

    #[test]
    fn test_up_without_down_is_ignored() {
        let mut sel = selector();
        sel.handle(PointerInput::Up { x: 10.0, y: 10.0 });
        assert_eq!(sel.state(), &SelectorState::Idle);
    }

    #[tokio::test]
    async fn test_select_area_from_channel() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(PointerInput::Down { x: 20.0, y: 30.0 }).await.unwrap();
        tx.send(PointerInput::Move { x: 220.0, y: 230.0 }).await.unwrap();
        tx.send(PointerInput::Up { x: 220.0, y: 230.0 }).await.unwrap();

        let rect = select_area(rx, Resolution::new(800, 600), &SelectionConfig::default())
            .await
            .unwrap();
        assert_eq!(rect, Rectangle::new(20.0, 30.0, 200.0, 200.0));
        // Selector released its input binding
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_closed_input_cancels() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(PointerInput::Down { x: 20.0, y: 30.0 }).await.unwrap();
        drop(tx);

        let result = select_area(rx, Resolution::new(800, 600), &SelectionConfig::default()).await;
        assert_eq!(result, Err(SelectionError::Cancelled));
    }
}
