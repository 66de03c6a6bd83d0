//! Static initializer builder
//!
//! Decomposes a global's constant initializer into scalar leaves at their
//! cumulative byte offsets and writes every non-zero leaf. Memory starts out
//! zeroed, so zero leaves are skipped.
//!
//! For `int x[4] = {0, 0, 5, 0}` the result is the single write
//! `$M.r[$add.ref(x, 8)] := 5`.
//!
//! Leaves are produced in offset order and globals are processed in
//! declaration order, so the statement sequence is deterministic.

use super::context::UnitContext;
use super::region::AccessSite;
use crate::ir::{Constant, GlobalVariable, Type};
use crate::vil::{Expr, Stmt};
use crate::{Error, Result};

/// A scalar piece of an initializer
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub offset: u64,
    pub ty: Type,
    pub value: Constant,
}

impl UnitContext<'_> {
    /// Non-zero scalar leaves of `constant` laid out as `global.ty`, in offset order
    pub fn initializer_leaves(&mut self, global: &GlobalVariable, constant: &Constant) -> Result<Vec<Leaf>> {
        let mut leaves = vec![];
        self.collect_leaves(&global.name, &global.ty, constant, 0, &mut leaves)?;
        Ok(leaves)
    }

    fn collect_leaves(
        &mut self,
        global: &str,
        ty: &Type,
        constant: &Constant,
        offset: u64,
        out: &mut Vec<Leaf>,
    ) -> Result<()> {
        match constant {
            Constant::Zero(zty) | Constant::Undef(zty) => {
                if zty != ty {
                    return Err(Error::shape_mismatch(
                        global,
                        format!("expected {}, found zero value of {}", ty, zty),
                    ));
                }
                Ok(())
            }
            Constant::Array { element, elements } => {
                let Type::Array { element: declared, count } = ty else {
                    return Err(Error::shape_mismatch(global, format!("expected {}, found an array", ty)));
                };
                if **declared != *element || *count != elements.len() as u64 {
                    return Err(Error::shape_mismatch(
                        global,
                        format!(
                            "expected {}, found [{} x {}]",
                            ty,
                            elements.len(),
                            element
                        ),
                    ));
                }
                let stride = self.address.stride(self.layout, element)?;
                for (i, item) in elements.iter().enumerate() {
                    self.collect_leaves(global, element, item, offset + i as u64 * stride, out)?;
                }
                Ok(())
            }
            Constant::Struct { ty: st, fields } => {
                let Type::Struct(declared) = ty else {
                    return Err(Error::shape_mismatch(global, format!("expected {}, found a struct", ty)));
                };
                if declared != st || fields.len() != st.fields.len() {
                    return Err(Error::shape_mismatch(
                        global,
                        format!("expected {}, found a struct with {} fields", ty, fields.len()),
                    ));
                }
                for (i, (field_ty, item)) in st.fields.iter().zip(fields).enumerate() {
                    let field_offset = self.address.field_offset(self.layout, st, i)?;
                    self.collect_leaves(global, field_ty, item, offset + field_offset, out)?;
                }
                Ok(())
            }
            scalar => {
                let found = scalar.ty();
                if found != *ty {
                    return Err(Error::shape_mismatch(global, format!("expected {}, found {}", ty, found)));
                }
                if !scalar.is_zero() {
                    out.push(Leaf {
                        offset,
                        ty: ty.clone(),
                        value: scalar.clone(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Write statements initializing `global` with `constant`
    pub fn build_init(&mut self, global: &GlobalVariable, constant: &Constant) -> Result<Vec<Stmt>> {
        let leaves = self.initializer_leaves(global, constant)?;
        let base = Expr::var(self.naming.global(&global.name));
        let mut stmts = vec![];
        for leaf in leaves {
            let region = self
                .regions
                .region_of(&AccessSite::global(&global.name, leaf.offset))?;
            let vty = self.encoder.encode(self.layout, &leaf.ty)?;
            let size = self.layout.store_size(&leaf.ty)?;
            let value = self.constant(&leaf.value, &global.name)?;
            let addr = self
                .address
                .add_offset(&mut self.encoder, base.clone(), leaf.offset as i128);
            self.write(region, addr, value, &vty, size, &mut stmts, None)?;
        }
        tracing::trace!(global = %global.name, writes = stmts.len(), "static initializer");
        Ok(stmts)
    }
}
