//! 层级扁平化
//!
//! 材料 → 子材料 → 目标按声明顺序遍历，每个叶子目标恰好产出一条 FlatObjectiveRecord。
//! 材料序号跨整棵树计数（不按学期重置），目标序号在每个材料内重置、跨子材料累加。

use crate::curriculum::{CurriculumTree, FlatObjectiveRecord};

/// 扁平化课程树；纯函数，同一棵树多次调用结果（含编码）完全一致
pub fn flatten(tree: &CurriculumTree) -> Vec<FlatObjectiveRecord> {
    let mut out = Vec::with_capacity(tree.objective_count());
    for (material_index, material) in tree.materials.iter().enumerate() {
        let objectives = material
            .sub_materials
            .iter()
            .flat_map(|sub| sub.objectives.iter());
        for (objective_index, text) in objectives.enumerate() {
            out.push(FlatObjectiveRecord {
                semester: material.semester.clone(),
                material_title: material.title.clone(),
                objective_text: text.clone(),
                code: format!("{}.{}", material_index + 1, objective_index + 1),
                material_index,
            });
        }
    }
    out
}
