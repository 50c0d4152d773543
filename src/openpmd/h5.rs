//! HDF5 backend.
//!
//! Writes the series with the group hierarchy of the openPMD HDF5 mapping:
//! `/data/<iteration>/particles/<species>/<record>/<component>`. Datasets
//! are chunked along the particle axis.

use super::{
    Component, ComponentData, Iteration, OpenPmdError, ParticleSpecies, Record, Series,
    SeriesBackend, BASE_PATH, OPENPMD_VERSION, PARTICLES_PATH, SCALAR,
};
use crate::units::UnitDimension;
use hdf5::types::VarLenUnicode;
use hdf5::{File, Group, Location};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// openPMD series stored as a single HDF5 file
pub struct Hdf5Backend;

impl SeriesBackend for Hdf5Backend {
    fn name(&self) -> &'static str {
        "hdf5"
    }

    fn write(&self, series: &Series, path: &Path) -> Result<(), OpenPmdError> {
        let file = File::create(path)?;
        set_attr_str(&file, "openPMD", OPENPMD_VERSION)?;
        file.new_attr::<u32>()
            .create("openPMDextension")?
            .write_scalar(&0u32)?;
        set_attr_str(&file, "basePath", BASE_PATH)?;
        set_attr_str(&file, "particlesPath", PARTICLES_PATH)?;
        set_attr_str(&file, "iterationEncoding", "groupBased")?;
        set_attr_str(&file, "iterationFormat", BASE_PATH)?;
        set_attr_str(&file, "software", &series.software)?;
        set_attr_str(&file, "softwareVersion", env!("CARGO_PKG_VERSION"))?;

        let data = file.create_group("data")?;
        for (index, iteration) in &series.iterations {
            write_iteration(&data.create_group(&index.to_string())?, iteration)?;
        }
        file.flush()?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Series, OpenPmdError> {
        let file = File::open(path)?;
        let version = read_attr_str(&file, "openPMD")?;
        if !version.starts_with("1.") {
            return Err(OpenPmdError::Format(format!(
                "unsupported openPMD version {version}"
            )));
        }
        let software = read_attr_str(&file, "software").unwrap_or_else(|_| "unknown".to_string());

        let data = file.group("data")?;
        let mut iterations = BTreeMap::new();
        for name in data.member_names()? {
            let index: u64 = name
                .parse()
                .map_err(|_| OpenPmdError::Format(format!("bad iteration index `{name}`")))?;
            iterations.insert(index, read_iteration(&data.group(&name)?)?);
        }

        Ok(Series {
            software,
            iterations,
        })
    }
}

fn write_iteration(group: &Group, iteration: &Iteration) -> Result<(), OpenPmdError> {
    set_attr_f64(group, "time", iteration.time)?;
    set_attr_f64(group, "dt", iteration.dt)?;
    set_attr_f64(group, "timeUnitSI", iteration.time_unit_si)?;

    let particles = group.create_group("particles")?;
    for (name, species) in &iteration.species {
        let species_group = particles.create_group(name)?;
        for (record_name, record) in &species.records {
            write_record(&species_group, record_name, record)?;
        }
    }
    Ok(())
}

fn write_record(parent: &Group, name: &str, record: &Record) -> Result<(), OpenPmdError> {
    if record.is_scalar() {
        let component = record.component(SCALAR)?;
        return write_component(parent, name, component, Some(record));
    }

    let group = parent.create_group(name)?;
    write_record_attrs(&group, record)?;
    for (component_name, component) in &record.components {
        write_component(&group, component_name, component, None)?;
    }
    Ok(())
}

fn write_record_attrs(location: &Location, record: &Record) -> Result<(), OpenPmdError> {
    location
        .new_attr::<f64>()
        .shape(record.unit_dimension.len())
        .create("unitDimension")?
        .write_raw(&record.unit_dimension[..])?;
    set_attr_f64(location, "timeOffset", record.time_offset)
}

/// Write a component as a dataset, or as an attribute-only group when it
/// is constant. A scalar record passes itself so its attributes land on
/// the same object.
fn write_component(
    parent: &Group,
    name: &str,
    component: &Component,
    scalar_record: Option<&Record>,
) -> Result<(), OpenPmdError> {
    let finish = |location: &Location| -> Result<(), OpenPmdError> {
        set_attr_f64(location, "unitSI", component.unit_si)?;
        if let Some(record) = scalar_record {
            write_record_attrs(location, record)?;
        }
        Ok(())
    };

    match &component.data {
        ComponentData::Values(values) => {
            let mut builder = parent.new_dataset::<f64>().shape(values.len());
            if !values.is_empty() {
                builder = builder.chunk(values.len());
            }
            let dataset = builder.create(name)?;
            dataset.write_raw(&values[..])?;
            finish(&dataset)
        }
        ComponentData::Constant { value, shape } => {
            let group = parent.create_group(name)?;
            set_attr_f64(&group, "value", *value)?;
            group
                .new_attr::<u64>()
                .shape(shape.len())
                .create("shape")?
                .write_raw(&shape[..])?;
            finish(&group)
        }
    }
}

fn read_iteration(group: &Group) -> Result<Iteration, OpenPmdError> {
    let mut iteration = Iteration::default();
    iteration.time = read_attr_f64(group, "time").unwrap_or(iteration.time);
    iteration.dt = read_attr_f64(group, "dt").unwrap_or(iteration.dt);
    iteration.time_unit_si = read_attr_f64(group, "timeUnitSI").unwrap_or(1.0);

    if group.link_exists("particles") {
        let particles = group.group("particles")?;
        for name in particles.member_names()? {
            let species_group = particles.group(&name)?;
            let mut species = ParticleSpecies::default();
            for record_name in species_group.member_names()? {
                species
                    .records
                    .insert(record_name.clone(), read_record(&species_group, &record_name)?);
            }
            iteration.species.insert(name, species);
        }
    }
    Ok(iteration)
}

fn read_record(parent: &Group, name: &str) -> Result<Record, OpenPmdError> {
    // Scalar record stored directly as a dataset
    if let Ok(dataset) = parent.dataset(name) {
        let component = Component::values(read_attr_f64(&dataset, "unitSI")?, dataset.read_raw()?);
        return record_from_parts(&dataset, component_map(component));
    }

    let group = parent.group(name)?;
    if group.attr("value").is_ok() {
        let component = read_constant(&group)?;
        return record_from_parts(&group, component_map(component));
    }

    let mut components = BTreeMap::new();
    for component_name in group.member_names()? {
        let component = if let Ok(dataset) = group.dataset(&component_name) {
            Component::values(read_attr_f64(&dataset, "unitSI")?, dataset.read_raw()?)
        } else {
            read_constant(&group.group(&component_name)?)?
        };
        components.insert(component_name, component);
    }
    record_from_parts(&group, components)
}

fn component_map(component: Component) -> BTreeMap<String, Component> {
    let mut map = BTreeMap::new();
    map.insert(SCALAR.to_string(), component);
    map
}

fn record_from_parts(
    location: &Location,
    components: BTreeMap<String, Component>,
) -> Result<Record, OpenPmdError> {
    let dims: Vec<f64> = location.attr("unitDimension")?.read_raw()?;
    let unit_dimension: UnitDimension = dims.as_slice().try_into().map_err(|_| {
        OpenPmdError::Format(format!("{}: unitDimension must have 7 entries", location.name()))
    })?;
    Ok(Record {
        unit_dimension,
        time_offset: read_attr_f64(location, "timeOffset").unwrap_or(0.0),
        components,
    })
}

fn read_constant(group: &Group) -> Result<Component, OpenPmdError> {
    Ok(Component {
        unit_si: read_attr_f64(group, "unitSI")?,
        data: ComponentData::Constant {
            value: read_attr_f64(group, "value")?,
            shape: group.attr("shape")?.read_raw()?,
        },
    })
}

fn set_attr_f64(location: &Location, name: &str, value: f64) -> Result<(), OpenPmdError> {
    location.new_attr::<f64>().create(name)?.write_scalar(&value)?;
    Ok(())
}

fn set_attr_str(location: &Location, name: &str, value: &str) -> Result<(), OpenPmdError> {
    let value = VarLenUnicode::from_str(value)
        .map_err(|e| OpenPmdError::Format(format!("invalid string attribute `{name}`: {e}")))?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr_f64(location: &Location, name: &str) -> Result<f64, OpenPmdError> {
    Ok(location.attr(name)?.read_scalar::<f64>()?)
}

fn read_attr_str(location: &Location, name: &str) -> Result<String, OpenPmdError> {
    let value: VarLenUnicode = location.attr(name)?.read_scalar()?;
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::{Axis, Beam};
    use tempfile::tempdir;

    #[test]
    fn hdf5_series_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("electrons_opmd.h5");

        let mut series = Series::new();
        series.add_beam(1, &Beam::synthetic(5));
        Hdf5Backend.write(&series, &path).unwrap();

        let back = Hdf5Backend.read(&path).unwrap();
        assert_eq!(back, series);

        let beam = back
            .iteration(1)
            .unwrap()
            .species("electrons")
            .unwrap()
            .to_beam("electrons")
            .unwrap();
        let z = beam.position_axis(Axis::Z);
        assert!((z[4] - 5.0e-8).abs() < 1e-20);
    }
}
