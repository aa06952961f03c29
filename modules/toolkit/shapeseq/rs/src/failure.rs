use derive_more::Display;

/// Terminal reason a read pair was not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum Failure {
    #[display("indeterminate sequence failure")]
    Indeterminate,
    #[display("mask failure")]
    Mask,
    #[display("R2 match not found")]
    R2NotFound,
    #[display("multiple target match")]
    MultipleTargets,
    #[display("R1 match not found")]
    R1NotFound,
    #[display("linker match failure")]
    Linker,
    #[display("R2 to left of site 0 failure")]
    LeftOfTarget,
    #[display("cotrans minimum")]
    CotransMinimum,
    #[display("adapter trim failure")]
    AdapterTrim,
    #[display("R1/R2 mismatch")]
    R1R2Mismatch,
    #[display("R1 right edge failure")]
    R1RightEdge,
    #[display("match errors failure")]
    MatchErrors,
    #[display("edge mutation discarded")]
    EdgeMutation,
}

impl Failure {
    /// Every failure kind in pipeline order.
    pub const ALL: [Failure; 13] = [
        Failure::Indeterminate,
        Failure::Mask,
        Failure::R2NotFound,
        Failure::MultipleTargets,
        Failure::R1NotFound,
        Failure::Linker,
        Failure::LeftOfTarget,
        Failure::CotransMinimum,
        Failure::AdapterTrim,
        Failure::R1R2Mismatch,
        Failure::R1RightEdge,
        Failure::MatchErrors,
        Failure::EdgeMutation,
    ];
}
