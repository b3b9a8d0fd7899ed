//! Patch fields tied to a constraint patch kind: empty, cyclic and processor.

use log::{debug, warn};

use super::patch_field::patch_field_boilerplate;
use super::{PatchContext, PatchField, PatchFieldCore, PatchFieldMapper};
use crate::solver::comms::CommsType;
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::mesh::PatchKind;
use crate::solver::primitives::FieldElement;

/// Placeholder for a patch that carries no faces in the solved dimensions.
/// It holds no values and contributes no coefficients.
#[derive(Debug, Clone)]
pub struct EmptyPatchField<T> {
    core: PatchFieldCore<T>,
}

impl<T: FieldElement> EmptyPatchField<T> {
    pub const TYPE_NAME: &'static str = "empty";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::new(ctx, Vec::new()),
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        Ok(Self {
            core: PatchFieldCore::new(ctx, Vec::new()).with_dict(dict)?,
        })
    }
}

impl<T: FieldElement> PatchField<T> for EmptyPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    fn constraint_type(&self) -> Option<&'static str> {
        Some(Self::TYPE_NAME)
    }

    fn sn_grad(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(Vec::new())
    }

    fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(Vec::new())
    }

    fn value_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(Vec::new())
    }

    fn gradient_internal_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(Vec::new())
    }

    fn gradient_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(Vec::new())
    }

    fn auto_map(&mut self, _mapper: &PatchFieldMapper, _ctx: &PatchContext<'_, T>) -> FieldResult<()> {
        Ok(())
    }

    fn write(&self, dict: &mut Dictionary) {
        dict.set_value("type", Self::TYPE_NAME.into());
    }
}

/// Coupled coefficients shared by the cyclic and processor fields: the
/// boundary coefficients multiply the neighbour values.
macro_rules! coupled_coefficients {
    () => {
        fn coupled(&self) -> bool {
            true
        }

        fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, T>, weights: &[f64]) -> FieldResult<Vec<T>> {
            Ok(weights.iter().map(|&w| T::one() * w).collect())
        }

        fn value_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>, weights: &[f64]) -> FieldResult<Vec<T>> {
            Ok(weights.iter().map(|&w| T::one() * (1.0 - w)).collect())
        }

        fn gradient_internal_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
            Ok(ctx
                .patch()
                .delta_coeffs()
                .iter()
                .map(|&dc| -T::one() * dc)
                .collect())
        }

        fn gradient_boundary_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
            Ok(ctx
                .patch()
                .delta_coeffs()
                .iter()
                .map(|&dc| T::one() * dc)
                .collect())
        }

        fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
            let pnf = self.patch_neighbour_field(ctx)?;
            Ok(ctx
                .patch_internal_field()
                .into_iter()
                .zip(pnf)
                .zip(ctx.patch().delta_coeffs())
                .map(|((i, n), &dc)| (n - i) * dc)
                .collect())
        }
    };
}

/// Periodic coupling to a partner patch of the same mesh.
#[derive(Debug, Clone)]
pub struct CyclicPatchField<T> {
    core: PatchFieldCore<T>,
}

impl<T: FieldElement> CyclicPatchField<T> {
    pub const TYPE_NAME: &'static str = "cyclic";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::zeroed(ctx),
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut field = Self {
            core: PatchFieldCore::zeroed(ctx).with_dict(dict)?,
        };
        field.evaluate(ctx, CommsType::Blocking)?;
        Ok(field)
    }
}

impl<T: FieldElement> PatchField<T> for CyclicPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    coupled_coefficients!();

    fn constraint_type(&self) -> Option<&'static str> {
        Some(Self::TYPE_NAME)
    }

    fn patch_neighbour_field(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        match ctx.patch().kind() {
            PatchKind::Cyclic { neighbour_patch } => {
                Ok(ctx.mesh.patch(neighbour_patch).patch_internal_field(ctx.internal))
            }
            other => {
                warn!(
                    "cyclic field {} on {other} patch {} has no partner, using the internal field",
                    self.core.field_name, self.core.patch_name
                );
                Ok(ctx.patch_internal_field())
            }
        }
    }

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        let pnf = self.patch_neighbour_field(ctx)?;
        self.core.values = ctx
            .patch_internal_field()
            .into_iter()
            .zip(pnf)
            .zip(ctx.patch().weights())
            .map(|((i, n), &w)| i * w + n * (1.0 - w))
            .collect();
        Ok(())
    }
}

/// Coupling to the matching patch on another partition. After evaluation
/// the patch values hold the neighbour partition's adjacent-cell values.
#[derive(Debug, Clone)]
pub struct ProcessorPatchField<T> {
    core: PatchFieldCore<T>,
}

impl<T: FieldElement> ProcessorPatchField<T> {
    pub const TYPE_NAME: &'static str = "processor";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::new(ctx, ctx.patch_internal_field()),
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut core = PatchFieldCore::new(ctx, ctx.patch_internal_field()).with_dict(dict)?;
        if let Some(values) = core.read_optional(dict, "value")? {
            core.values = values;
        }
        Ok(Self { core })
    }

    fn peer(&self, ctx: &PatchContext<'_, T>) -> Option<(usize, usize)> {
        match ctx.patch().kind() {
            PatchKind::Processor {
                neighb_proc, tag, ..
            } if ctx.comms().par_run() => Some((neighb_proc, tag)),
            _ => None,
        }
    }

    fn unpack(&self, data: Vec<f64>) -> FieldResult<Vec<T>> {
        if data.len() != self.size() * T::N_COMPONENTS {
            return Err(FieldError::SizeMismatch {
                what: "received neighbour values".to_string(),
                field: format!("{} on patch {}", self.core.field_name, self.core.patch_name),
                expected: self.size() * T::N_COMPONENTS,
                actual: data.len(),
            });
        }
        Ok(data.chunks(T::N_COMPONENTS).map(T::from_components).collect())
    }
}

impl<T: FieldElement> PatchField<T> for ProcessorPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    coupled_coefficients!();

    fn constraint_type(&self) -> Option<&'static str> {
        Some(Self::TYPE_NAME)
    }

    fn patch_neighbour_field(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(self.core.values.clone())
    }

    fn init_evaluate(&mut self, ctx: &PatchContext<'_, T>, comms: CommsType) -> FieldResult<()> {
        let Some((neighbour, tag)) = self.peer(ctx) else {
            return Ok(());
        };
        let data: Vec<f64> = ctx
            .patch_internal_field()
            .iter()
            .flat_map(FieldElement::to_components)
            .collect();
        let pstream = ctx.comms();
        if comms == CommsType::NonBlocking {
            pstream.isend(neighbour, tag, data)?;
            pstream.irecv(neighbour, tag)?;
        } else {
            pstream.send(neighbour, tag, data)?;
        }
        debug!(
            "processor patch {}: sent {} faces of {} to rank {neighbour}",
            self.core.patch_name,
            self.size(),
            self.core.field_name
        );
        Ok(())
    }

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        let Some((neighbour, tag)) = self.peer(ctx) else {
            return Ok(());
        };
        let data = ctx.comms().receive(neighbour, tag)?;
        self.core.values = self.unpack(data)?;
        Ok(())
    }
}
