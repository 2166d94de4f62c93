//! Dataset value reads, writes, and resizing.

use tracing::debug;

use arbor_codec::{encode_value, fill_value, NdArray};
use arbor_types::ObjectUuid;

use crate::container::ObjectBody;
use crate::error::{StoreError, StoreResult};
use crate::selection::{strides, Hyperslab, Selection};
use crate::store::{check_max_shape, ObjectStore};

impl ObjectStore {
    /// Read a dataset, or the region named by `selection`. Cells never
    /// written read as the type's fill value.
    pub fn read_values(&self, id: &ObjectUuid, selection: Option<&dyn Selection>) -> StoreResult<NdArray> {
        let body = self.dataset(id)?;
        let ty = self.descriptor_of(&body.schema)?;
        let whole = Hyperslab::all(&body.shape);
        let region = selection.unwrap_or(&whole).resolve(&body.shape)?;
        let fill = fill_value(&ty);
        let elements = region
            .indices
            .iter()
            .map(|&i| match &body.values {
                Some(values) => values.get(i).cloned().unwrap_or_else(|| fill.clone()),
                None => fill.clone(),
            })
            .collect();
        Ok(NdArray::new(region.shape, elements)?)
    }

    /// Write `data` over the whole dataset or over `selection`. The block
    /// must hold exactly as many elements as the region selects.
    pub fn write_values(
        &mut self,
        id: &ObjectUuid,
        data: NdArray,
        selection: Option<&dyn Selection>,
    ) -> StoreResult<()> {
        let (region, ty, cells) = {
            let body = self.dataset(id)?;
            let whole = Hyperslab::all(&body.shape);
            let region = selection.unwrap_or(&whole).resolve(&body.shape)?;
            let cells: usize = body.shape.iter().product();
            (region, self.descriptor_of(&body.schema)?, cells)
        };
        if data.len() != region.indices.len() {
            return Err(StoreError::InvalidShape(format!(
                "selection holds {} elements, got {}",
                region.indices.len(),
                data.len()
            )));
        }
        encode_value(&ty, &data)?;
        let count = data.len();

        let obj = self.entry_mut(id)?;
        if let ObjectBody::Dataset(body) = &mut obj.body {
            let values = body.values.get_or_insert_with(|| vec![fill_value(&ty); cells]);
            for (index, element) in region.indices.into_iter().zip(data.elements) {
                if let Some(slot) = values.get_mut(index) {
                    *slot = element;
                }
            }
        }
        obj.touch();
        debug!(%id, count, "dataset values written");
        Ok(())
    }

    /// Change a dataset's extent. Rank is fixed and each extent must stay
    /// within the max shape; without a max shape the creation extent is the
    /// bound. Existing cells keep their multi-index.
    pub fn resize_dataset(&mut self, id: &ObjectUuid, shape: Vec<usize>) -> StoreResult<()> {
        let (bounds, fill) = {
            let body = self.dataset(id)?;
            if shape.len() != body.shape.len() {
                return Err(StoreError::InvalidShape(format!(
                    "rank {} cannot change to {}",
                    body.shape.len(),
                    shape.len()
                )));
            }
            let bounds = body
                .max_shape
                .clone()
                .unwrap_or_else(|| body.shape.iter().map(|&n| Some(n)).collect());
            (bounds, fill_value(&self.descriptor_of(&body.schema)?))
        };
        check_max_shape(&shape, &bounds)?;

        let obj = self.entry_mut(id)?;
        if let ObjectBody::Dataset(body) = &mut obj.body {
            if let Some(old) = body.values.take() {
                body.values = Some(remap(&old, &body.shape, &shape, &fill));
            }
            body.shape = shape;
            body.max_shape = Some(bounds);
        }
        obj.touch();
        debug!(%id, "dataset resized");
        Ok(())
    }
}

/// Copy `old` (row-major over `from`) into a new block over `to`, keeping
/// each surviving cell at the same multi-index.
fn remap<T: Clone>(old: &[T], from: &[usize], to: &[usize], fill: &T) -> Vec<T> {
    let total: usize = to.iter().product();
    let old_strides = strides(from);
    let new_strides = strides(to);
    (0..total)
        .map(|flat| {
            let mut old_flat = 0;
            for axis in 0..to.len() {
                let i = (flat / new_strides[axis]) % to[axis];
                if i >= from[axis] {
                    return fill.clone();
                }
                old_flat += i * old_strides[axis];
            }
            old.get(old_flat).cloned().unwrap_or_else(|| fill.clone())
        })
        .collect()
}
