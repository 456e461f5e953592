use std::io::Write;

use crate::defs::{Error, ErrorKind::*, IntoResult, Result};
use crate::vset::data::*;

fn write_line<W: Write + ?Sized>(writer: &mut W, line: String) -> Result<()> {
    writeln!(writer, "{}", line).res(|| format!("failed to write .vset line"))
}

/// Writes a view set with `primary` as the first view record. Poses keep
/// their original order, so view records reference them by original index.
pub fn write_view_set<W: Write + ?Sized>(
    writer: &mut W,
    view_set: &ViewSet,
    primary: usize,
) -> Result<()> {
    if !view_set.views.is_empty() && primary >= view_set.views.len() {
        let desc = format!("primary view {} is out of range", primary);
        return Err(Error::new(InconsistentState, desc));
    }

    write_line(writer, "# Created by view importance planner".to_string())?;
    write_line(
        writer,
        format!("c\t{}\t{}", view_set.near_plane, view_set.far_plane),
    )?;
    if let Some(geometry) = &view_set.geometry_file {
        write_line(writer, format!("m\t{}", geometry))?;
    }
    if let Some(path) = &view_set.image_path {
        write_line(writer, format!("i\t{}", path))?;
    }
    if let Some(path) = &view_set.full_res_image_path {
        write_line(writer, format!("I\t{}", path))?;
    }

    write_line(writer, "\n# Camera projections".to_string())?;
    for projection in &view_set.projections {
        let line = match projection {
            Projection::Fov { aspect, fovy } => {
                format!("f\t0\t0\t{}\t{}", aspect, fovy.to_degrees())
            }
            Projection::Distortion {
                aspect,
                focal_length,
                sensor_width,
                k1,
                k2,
                k3,
            } => format!(
                "D\t0\t0\t{}\t{}\t{}\t{}\t{}\t{}",
                aspect, focal_length, sensor_width, k1, k2, k3
            ),
        };
        write_line(writer, line)?;
    }

    write_line(writer, "\n# Tonemapping".to_string())?;
    write_line(writer, format!("g\t{}", view_set.gamma))?;
    for sample in &view_set.tonemap {
        let line = format!("e\t{}\t{}", sample.linear, sample.encoded);
        write_line(writer, line)?;
    }

    write_line(writer, "\n# Lights".to_string())?;
    for light in &view_set.lights {
        let (p, i) = (&light.position, &light.intensity);
        write_line(
            writer,
            format!("l\t{}\t{}\t{}\t{}\t{}\t{}", p.x, p.y, p.z, i.x, i.y, i.z),
        )?;
    }

    write_line(writer, "\n# Camera poses".to_string())?;
    for view in &view_set.views {
        let entries: Vec<String> = (0..4)
            .flat_map(|r| (0..4).map(move |c| (r, c)))
            .map(|(r, c)| view.pose[(r, c)].to_string())
            .collect();
        write_line(writer, format!("P\t{}", entries.join("\t")))?;
    }

    write_line(writer, "\n# Views".to_string())?;
    let order = std::iter::once(primary)
        .chain((0..view_set.views.len()).filter(|&i| i != primary))
        .take(view_set.views.len());
    for i in order {
        let view = &view_set.views[i];
        write_line(
            writer,
            format!(
                "v\t{}\t{}\t{}\t{}",
                i, view.projection, view.light, view.image_file
            ),
        )?;
    }

    writer.flush().res(|| format!("failed to flush .vset"))
}
