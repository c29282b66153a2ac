mod brush;
mod colorer;

pub use brush::{
    Brush, BrushContext, CompositionNodeBrush, CopierBrush, InvocationsBrush, InvocationsImplicitColorer,
    InvokeDynamicBrush, MethodParameterImplicitColorer, ParentAttributesDefinerBrush,
};
pub use colorer::color;
