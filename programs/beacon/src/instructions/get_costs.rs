use crate::costs::{completion_fees, CostModel, Costs};
use crate::state::RandomnessRequest;
use crate::storage::BoxMap;

/// Compute the pre-payment a request needs under `model`.
pub fn handler(model: &dyn CostModel) -> Costs {
    Costs {
        fees: completion_fees(model),
        box_mbr: BoxMap::<RandomnessRequest>::box_mbr(model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::StandardCostModel;

    #[test]
    fn standard_costs() {
        let costs = handler(&StandardCostModel::default());
        assert_eq!(costs.fees, 12_000);
        // 2500 + 400 * (8 key + 72 value)
        assert_eq!(costs.box_mbr, 34_500);
        assert_eq!(costs.total(), 46_500);
    }

    #[test]
    fn scales_with_cost_model() {
        let model = StandardCostModel {
            min_fee: 2_000,
            box_byte_cost: 0,
            ..StandardCostModel::default()
        };
        let costs = handler(&model);
        assert_eq!(costs.fees, 24_000);
        assert_eq!(costs.box_mbr, 2_500);
    }
}
