#![forbid(unsafe_code)]

//! Tile grid geometry override.
//!
//! Runs after the host recomputes its tile grid geometry. The first
//! invocation only records the host's cell width as the unscaled baseline.
//! Every later invocation restores that baseline before scaling, so repeated
//! refreshes with unchanged settings converge instead of compounding.
//!
//! The baseline is never recaptured. If the host rebuilds its layout object
//! with a different default cell width (density or theme change) the stale
//! baseline is still used.

use crate::config::PanelConfig;
use crate::error::HostError;
use crate::host::HostRef;
use crate::scaling;

/// Field and method names on the host's tile layout object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryFields {
    pub cell_width: &'static str,
    pub cell_height: &'static str,
    pub cell_margin: &'static str,
    pub cell_margin_top: &'static str,
    pub columns: &'static str,
    pub request_layout: &'static str,
}

impl Default for GeometryFields {
    fn default() -> Self {
        Self {
            cell_width: "mCellWidth",
            cell_height: "mCellHeight",
            cell_margin: "mCellMargin",
            cell_margin_top: "mCellMarginTop",
            columns: "mColumns",
            request_layout: "requestLayout",
        }
    }
}

impl GeometryFields {
    /// Ask the host to run its layout pass again.
    pub fn request_relayout(&self, layout: &HostRef) -> Result<(), HostError> {
        layout.call(self.request_layout, &[]).map(|_| ())
    }
}

/// What the adjuster did to one geometry pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutOutcome {
    /// First pass: the cell width baseline was recorded, nothing changed.
    BaselineCaptured { cell_width: i32 },
    /// Columns are `0`: the host's own geometry stands.
    HostDefault,
    /// Geometry overridden; the host's default result must be replaced.
    Overridden { columns: i32, factor: f32 },
}

impl LayoutOutcome {
    #[must_use]
    pub fn is_override(&self) -> bool {
        matches!(self, Self::Overridden { .. })
    }
}

/// Stateful geometry override for the host's tile layout.
#[derive(Debug, Clone, Default)]
pub struct LayoutAdjuster {
    fields: GeometryFields,
    original_cell_width: Option<i32>,
}

impl LayoutAdjuster {
    #[must_use]
    pub fn new(fields: GeometryFields) -> Self {
        Self {
            fields,
            original_cell_width: None,
        }
    }

    /// Baseline cell width, once captured.
    #[must_use]
    pub fn original_cell_width(&self) -> Option<i32> {
        self.original_cell_width
    }

    /// Rewrite `layout`'s geometry fields for `config`.
    ///
    /// Only mutates fields. Requesting a relayout is left to
    /// [`GeometryFields::request_relayout`] so the caller can release its own
    /// state before calling back into the host.
    pub fn adjust(
        &mut self,
        layout: &HostRef,
        config: &PanelConfig,
    ) -> Result<LayoutOutcome, HostError> {
        let f = &self.fields;
        let baseline = match self.original_cell_width {
            None => {
                let width = layout.int_field(f.cell_width)?;
                self.original_cell_width = Some(width);
                tracing::debug!(target: "tilehook.layout", cell_width = width, "captured baseline");
                return Ok(LayoutOutcome::BaselineCaptured { cell_width: width });
            }
            Some(width) => {
                layout.set_int_field(f.cell_width, width)?;
                width
            }
        };

        if config.columns == 0 {
            return Ok(LayoutOutcome::HostDefault);
        }

        layout.set_int_field(f.columns, config.columns)?;
        let factor = scaling::factor(config.columns, config.scale_correction_percent);
        if factor != 1.0 {
            let height = layout.int_field(f.cell_height)?;
            let margin = layout.int_field(f.cell_margin)?;
            let margin_top = layout.int_field(f.cell_margin_top)?;
            layout.set_int_field(f.cell_height, scaling::scale(height, factor))?;
            layout.set_int_field(f.cell_width, scaling::scale(baseline, factor))?;
            layout.set_int_field(f.cell_margin, scaling::scale(margin, factor))?;
            layout.set_int_field(f.cell_margin_top, scaling::scale(margin_top, factor))?;
            tracing::debug!(
                target: "tilehook.layout",
                columns = config.columns,
                factor = f64::from(factor),
                "scaling applied"
            );
        }
        Ok(LayoutOutcome::Overridden {
            columns: config.columns,
            factor,
        })
    }

    #[must_use]
    pub fn fields(&self) -> &GeometryFields {
        &self.fields
    }
}
