//! JSON backend.
//!
//! Lays the series out as a JSON tree mirroring the HDF5 group hierarchy:
//! every group is an object, attributes live under an `"attributes"` key
//! as `{ "datatype", "value" }` pairs, and datasets are objects holding
//! `"datatype"` and a flat `"data"` array.

use super::{
    Component, ComponentData, Iteration, OpenPmdError, ParticleSpecies, Record, Series,
    SeriesBackend, BASE_PATH, OPENPMD_VERSION, PARTICLES_PATH, SCALAR,
};
use crate::units::UnitDimension;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const ATTRIBUTES: &str = "attributes";

/// openPMD series stored as a single JSON document
pub struct JsonBackend;

impl SeriesBackend for JsonBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write(&self, series: &Series, path: &Path) -> Result<(), OpenPmdError> {
        let doc = series_to_json(series);
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, &doc)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Series, OpenPmdError> {
        let doc: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        series_from_json(&doc)
    }
}

fn attr(datatype: &str, value: Value) -> Value {
    json!({ "datatype": datatype, "value": value })
}

/// Serialize a series into the JSON document layout
pub fn series_to_json(series: &Series) -> Value {
    let mut root = Map::new();
    root.insert(
        ATTRIBUTES.to_string(),
        json!({
            "openPMD": attr("STRING", json!(OPENPMD_VERSION)),
            "openPMDextension": attr("UINT", json!(0)),
            "basePath": attr("STRING", json!(BASE_PATH)),
            "particlesPath": attr("STRING", json!(PARTICLES_PATH)),
            "iterationEncoding": attr("STRING", json!("groupBased")),
            "iterationFormat": attr("STRING", json!(BASE_PATH)),
            "software": attr("STRING", json!(series.software)),
            "softwareVersion": attr("STRING", json!(env!("CARGO_PKG_VERSION"))),
        }),
    );

    let mut data = Map::new();
    for (index, iteration) in &series.iterations {
        data.insert(index.to_string(), iteration_to_json(iteration));
    }
    root.insert("data".to_string(), Value::Object(data));
    Value::Object(root)
}

fn iteration_to_json(iteration: &Iteration) -> Value {
    let mut particles = Map::new();
    for (name, species) in &iteration.species {
        let mut group = Map::new();
        for (record_name, record) in &species.records {
            group.insert(record_name.clone(), record_to_json(record));
        }
        particles.insert(name.clone(), Value::Object(group));
    }

    json!({
        "attributes": {
            "time": attr("DOUBLE", json!(iteration.time)),
            "dt": attr("DOUBLE", json!(iteration.dt)),
            "timeUnitSI": attr("DOUBLE", json!(iteration.time_unit_si)),
        },
        "particles": particles,
    })
}

fn record_to_json(record: &Record) -> Value {
    let mut attrs = Map::new();
    attrs.insert(
        "unitDimension".to_string(),
        attr("ARR_DBL_7", json!(record.unit_dimension)),
    );
    attrs.insert("timeOffset".to_string(), attr("FLOAT", json!(record.time_offset)));

    // A scalar record is its own component: merge the two levels
    if record.is_scalar() {
        if let Some(component) = record.components.get(SCALAR) {
            let mut obj = component_to_json(component);
            if let Some(Value::Object(cattrs)) = obj.get_mut(ATTRIBUTES) {
                cattrs.extend(attrs);
            }
            return obj;
        }
    }

    let mut obj = Map::new();
    obj.insert(ATTRIBUTES.to_string(), Value::Object(attrs));
    for (name, component) in &record.components {
        obj.insert(name.clone(), component_to_json(component));
    }
    Value::Object(obj)
}

fn component_to_json(component: &Component) -> Value {
    match &component.data {
        ComponentData::Constant { value, shape } => json!({
            "attributes": {
                "unitSI": attr("DOUBLE", json!(component.unit_si)),
                "value": attr("DOUBLE", json!(value)),
                "shape": attr("VEC_ULONG", json!(shape)),
            }
        }),
        ComponentData::Values(values) => json!({
            "attributes": {
                "unitSI": attr("DOUBLE", json!(component.unit_si)),
            },
            "datatype": "DOUBLE",
            "data": values,
        }),
    }
}

/// Parse a JSON document back into a series
pub fn series_from_json(doc: &Value) -> Result<Series, OpenPmdError> {
    let root = as_object(doc, "/")?;
    let attrs = attributes(root, "/")?;

    let version = attr_str(attrs, "openPMD", "/")?;
    if !version.starts_with("1.") {
        return Err(OpenPmdError::Format(format!(
            "unsupported openPMD version {version}"
        )));
    }
    let software = attr_str(attrs, "software", "/").unwrap_or("unknown").to_string();

    let data = as_object(
        root.get("data")
            .ok_or_else(|| OpenPmdError::Format("missing /data group".to_string()))?,
        "/data",
    )?;

    let mut iterations = BTreeMap::new();
    for (key, value) in data {
        let index: u64 = key
            .parse()
            .map_err(|_| OpenPmdError::Format(format!("bad iteration index `{key}`")))?;
        iterations.insert(index, iteration_from_json(value, key)?);
    }

    Ok(Series {
        software,
        iterations,
    })
}

fn iteration_from_json(value: &Value, path: &str) -> Result<Iteration, OpenPmdError> {
    let obj = as_object(value, path)?;
    let mut iteration = Iteration::default();
    if let Ok(attrs) = attributes(obj, path) {
        iteration.time = attr_f64(attrs, "time", path).unwrap_or(iteration.time);
        iteration.dt = attr_f64(attrs, "dt", path).unwrap_or(iteration.dt);
        iteration.time_unit_si = attr_f64(attrs, "timeUnitSI", path).unwrap_or(1.0);
    }

    if let Some(particles) = obj.get("particles") {
        for (name, group) in as_object(particles, path)? {
            let group_path = format!("{path}/particles/{name}");
            let mut species = ParticleSpecies::default();
            for (record_name, record) in as_object(group, &group_path)? {
                if record_name == ATTRIBUTES {
                    continue;
                }
                let record_path = format!("{group_path}/{record_name}");
                species
                    .records
                    .insert(record_name.clone(), record_from_json(record, &record_path)?);
            }
            iteration.species.insert(name.clone(), species);
        }
    }
    Ok(iteration)
}

fn record_from_json(value: &Value, path: &str) -> Result<Record, OpenPmdError> {
    let obj = as_object(value, path)?;
    let attrs = attributes(obj, path)?;

    let dims = attr_vec_f64(attrs, "unitDimension", path)?;
    let unit_dimension: UnitDimension = dims.as_slice().try_into().map_err(|_| {
        OpenPmdError::Format(format!("{path}: unitDimension must have 7 entries"))
    })?;
    let time_offset = attr_f64(attrs, "timeOffset", path).unwrap_or(0.0);

    let is_scalar = obj.contains_key("data") || attrs.contains_key("value");
    let components = if is_scalar {
        let mut map = BTreeMap::new();
        map.insert(SCALAR.to_string(), component_from_json(obj, path)?);
        map
    } else {
        obj.iter()
            .filter(|(k, _)| k.as_str() != ATTRIBUTES)
            .map(|(name, v)| -> Result<(String, Component), OpenPmdError> {
                let cpath = format!("{path}/{name}");
                Ok((name.clone(), component_from_json(as_object(v, &cpath)?, &cpath)?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?
    };

    Ok(Record {
        unit_dimension,
        time_offset,
        components,
    })
}

fn component_from_json(obj: &Map<String, Value>, path: &str) -> Result<Component, OpenPmdError> {
    let attrs = attributes(obj, path)?;
    let unit_si = attr_f64(attrs, "unitSI", path)?;

    let data = if let Some(data) = obj.get("data") {
        let values = data
            .as_array()
            .ok_or_else(|| OpenPmdError::Format(format!("{path}: data is not an array")))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| OpenPmdError::Format(format!("{path}: non-numeric data")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        ComponentData::Values(values)
    } else {
        let value = attr_f64(attrs, "value", path)?;
        let shape = attr_vec_f64(attrs, "shape", path)?
            .into_iter()
            .map(|s| s as u64)
            .collect();
        ComponentData::Constant { value, shape }
    };

    Ok(Component { unit_si, data })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, OpenPmdError> {
    value
        .as_object()
        .ok_or_else(|| OpenPmdError::Format(format!("{path} is not a group")))
}

fn attributes<'a>(
    obj: &'a Map<String, Value>,
    path: &str,
) -> Result<&'a Map<String, Value>, OpenPmdError> {
    obj.get(ATTRIBUTES)
        .and_then(Value::as_object)
        .ok_or_else(|| OpenPmdError::Format(format!("{path} has no attributes")))
}

fn attr_value<'a>(
    attrs: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<&'a Value, OpenPmdError> {
    attrs
        .get(name)
        .and_then(|a| a.get("value"))
        .ok_or_else(|| OpenPmdError::Format(format!("{path}: missing attribute `{name}`")))
}

fn attr_f64(attrs: &Map<String, Value>, name: &str, path: &str) -> Result<f64, OpenPmdError> {
    attr_value(attrs, name, path)?
        .as_f64()
        .ok_or_else(|| OpenPmdError::Format(format!("{path}: attribute `{name}` is not a number")))
}

fn attr_str<'a>(
    attrs: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<&'a str, OpenPmdError> {
    attr_value(attrs, name, path)?
        .as_str()
        .ok_or_else(|| OpenPmdError::Format(format!("{path}: attribute `{name}` is not a string")))
}

fn attr_vec_f64(
    attrs: &Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<Vec<f64>, OpenPmdError> {
    attr_value(attrs, name, path)?
        .as_array()
        .and_then(|a| a.iter().map(Value::as_f64).collect::<Option<Vec<_>>>())
        .ok_or_else(|| OpenPmdError::Format(format!("{path}: attribute `{name}` is not an array")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::{Axis, Beam};

    #[test]
    fn layout_matches_openpmd_paths() {
        let mut series = Series::new();
        series.add_beam(1, &Beam::synthetic(5));
        let doc = series_to_json(&series);

        assert_eq!(doc["attributes"]["openPMD"]["value"], "1.1.0");
        assert_eq!(doc["attributes"]["basePath"]["value"], "/data/%T/");

        let electrons = &doc["data"]["1"]["particles"]["electrons"];
        assert_eq!(electrons["position"]["x"]["data"].as_array().unwrap().len(), 5);
        assert_eq!(electrons["velocity"]["vz"]["attributes"]["unitSI"]["value"], 1.0e6);
        assert_eq!(electrons["mass"]["attributes"]["shape"]["value"], json!([5]));
        assert_eq!(
            electrons["charge"]["attributes"]["unitDimension"]["value"],
            json!([0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0])
        );
        assert_eq!(electrons["positionOffset"]["y"]["attributes"]["value"]["value"], 0.0);
    }

    #[test]
    fn document_reads_back() {
        let mut series = Series::new();
        series.add_beam(1, &Beam::synthetic(5));
        let doc = series_to_json(&series);

        let back = series_from_json(&doc).unwrap();
        assert_eq!(back, series);

        let beam = back
            .iteration(1)
            .unwrap()
            .species("electrons")
            .unwrap()
            .to_beam("electrons")
            .unwrap();
        let y = beam.position_axis(Axis::Y);
        assert!((y[1] - 3.0e-9).abs() < 1e-20);
    }

    #[test]
    fn rejects_foreign_documents() {
        let doc = json!({ "attributes": { "openPMD": { "datatype": "STRING", "value": "2.0.0" } } });
        assert!(matches!(
            series_from_json(&doc),
            Err(OpenPmdError::Format(_))
        ));
        assert!(series_from_json(&json!([1, 2])).is_err());
    }
}
