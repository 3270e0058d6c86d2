use crate::domain::model::{Expansion, ParameterAxis, ParameterSet, QuerySpec};
use crate::utils::error::{RefreshError, Result};

/// 把 query 的參數維度展開成依序執行的參數集
pub fn expand(query: &QuerySpec) -> Result<Vec<ParameterSet>> {
    let axes = &query.parameter_axes;

    if axes.is_empty() {
        return Ok(vec![ParameterSet::empty()]);
    }

    if let Some(axis) = axes.iter().find(|axis| axis.values.is_empty()) {
        return Err(RefreshError::config(format!(
            "query {}: parameter '{}' has no values",
            query.query_id, axis.name
        )));
    }

    match query.expansion {
        Expansion::Zip => zip_axes(&query.query_id, axes),
        Expansion::Cartesian => Ok(cartesian_axes(axes)),
    }
}

fn zip_axes(query_id: &str, axes: &[ParameterAxis]) -> Result<Vec<ParameterSet>> {
    let len = axes[0].values.len();

    if let Some(axis) = axes.iter().find(|axis| axis.values.len() != len) {
        return Err(RefreshError::config(format!(
            "query {}: parameter '{}' has {} values but '{}' has {}; zipped parameters must be the same length",
            query_id,
            axis.name,
            axis.values.len(),
            axes[0].name,
            len
        )));
    }

    Ok((0..len)
        .map(|i| {
            axes.iter()
                .map(|axis| (axis.name.as_str(), axis.values[i].as_str()))
                .collect()
        })
        .collect())
}

fn cartesian_axes(axes: &[ParameterAxis]) -> Vec<ParameterSet> {
    let total: usize = axes.iter().map(|axis| axis.values.len()).product();

    (0..total)
        .map(|combination| {
            // 由最後一個維度開始做混合進位分解，讓第一個維度變化最慢
            let mut indices = vec![0; axes.len()];
            let mut rest = combination;
            for (slot, axis) in indices.iter_mut().zip(axes).rev() {
                *slot = rest % axis.values.len();
                rest /= axis.values.len();
            }

            axes.iter()
                .zip(indices)
                .map(|(axis, i)| (axis.name.as_str(), axis.values[i].as_str()))
                .collect()
        })
        .collect()
}
