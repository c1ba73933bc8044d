use std::collections::HashMap;
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocRef, Document};
use crate::index::definition::{IndexDefinition, IndexType};
use crate::index::operator::IndexOperator;
use crate::index::query::{Challenge, ContextData, DocFilter, IndexIterator, QueryContext};
use crate::index::{IndexBase, IndexOps};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great circle distance in meters.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Debug)]
struct GeoPoint {
    latitude: f64,
    longitude: f64,
    doc: DocRef,
}

enum Coordinates {
    Missing,
    Invalid,
    Valid(f64, f64),
}

/// Location index over either one combined attribute (`[lat, lon]`, or
/// `[lon, lat]` in GeoJSON order) or two separate attributes.
#[derive(Debug)]
pub struct GeoIndex {
    base: IndexBase,
    geo_json: bool,
    constraint: bool,
    points: Vec<Option<GeoPoint>>,
    slots: HashMap<String, usize>,
}

impl GeoIndex {
    pub fn new(definition: &IndexDefinition) -> Self {
        GeoIndex {
            base: IndexBase::from_definition(definition),
            geo_json: definition.geo_json.unwrap_or(false),
            constraint: definition.constraint.unwrap_or(false),
            points: Vec::new(),
            slots: HashMap::new(),
        }
    }

    fn coordinates(&self, doc: &Document) -> Coordinates {
        let number = |value: Option<&Value>| value.and_then(Value::as_f64);

        let (latitude, longitude) = if self.base.kind == IndexType::Geo1 {
            match doc.attribute(&self.base.fields[0]) {
                None | Some(Value::Null) => return Coordinates::Missing,
                Some(Value::Array(pair)) if pair.len() == 2 => {
                    let (first, second) = (number(pair.first()), number(pair.get(1)));
                    if self.geo_json { (second, first) } else { (first, second) }
                }
                Some(_) => return Coordinates::Invalid,
            }
        } else {
            let latitude = doc.attribute(&self.base.fields[0]);
            let longitude = doc.attribute(&self.base.fields[1]);
            let absent = |value: Option<&Value>| value.is_none_or(Value::is_null);
            if absent(latitude) && absent(longitude) {
                return Coordinates::Missing;
            }
            (number(latitude), number(longitude))
        };

        match (latitude, longitude) {
            (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {
                Coordinates::Valid(lat, lon)
            }
            _ => Coordinates::Invalid,
        }
    }

    fn live_points(&self) -> impl Iterator<Item = &GeoPoint> {
        self.points.iter().flatten()
    }

    fn by_distance(&self, latitude: f64, longitude: f64) -> Vec<(f64, DocRef)> {
        let mut found: Vec<(f64, DocRef)> = self
            .live_points()
            .map(|p| (haversine(latitude, longitude, p.latitude, p.longitude), p.doc.clone()))
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.key.cmp(&b.1.key)));
        found
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl IndexOps for GeoIndex {
    fn base(&self) -> &IndexBase {
        &self.base
    }

    fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            geo_json: (self.base.kind == IndexType::Geo1).then_some(self.geo_json),
            constraint: Some(self.constraint),
            ..self.base.definition()
        }
    }

    fn insert(&mut self, doc: &DocRef) -> Result<()> {
        let (latitude, longitude) = match self.coordinates(doc) {
            Coordinates::Valid(lat, lon) => (lat, lon),
            Coordinates::Missing if self.constraint && !self.base.ignore_null => {
                return Err(Error::new(
                    ErrorKind::GeoIndexViolated,
                    format!("document '{}' has no coordinates", doc.key),
                ));
            }
            Coordinates::Invalid if self.constraint => {
                return Err(Error::new(
                    ErrorKind::GeoIndexViolated,
                    format!("document '{}' has invalid coordinates", doc.key),
                ));
            }
            _ => return Ok(()),
        };

        self.slots.insert(doc.key.clone(), self.points.len());
        self.points.push(Some(GeoPoint { latitude, longitude, doc: doc.clone() }));
        Ok(())
    }

    fn remove(&mut self, doc: &DocRef) -> Result<()> {
        if let Some(slot) = self.slots.remove(&doc.key) {
            self.points[slot] = None;
        }
        Ok(())
    }

    fn has_cleanup(&self) -> bool {
        true
    }

    /// Drops the holes left by removals.
    fn cleanup(&mut self) -> Result<()> {
        if self.points.len() == self.slots.len() {
            return Ok(());
        }

        self.points.retain(Option::is_some);
        self.slots = self
            .points
            .iter()
            .enumerate()
            .filter_map(|(slot, point)| point.as_ref().map(|p| (p.doc.key.clone(), slot)))
            .collect();
        Ok(())
    }

    fn challenge(&self, op: &IndexOperator) -> Challenge {
        let data = match op {
            IndexOperator::Within { fields, latitude, longitude, radius } if *fields == self.base.fields => {
                ContextData::Within { latitude: *latitude, longitude: *longitude, radius: *radius }
            }
            IndexOperator::Near { fields, latitude, longitude, limit } if *fields == self.base.fields => {
                ContextData::Near { latitude: *latitude, longitude: *longitude, limit: *limit }
            }
            _ => return Challenge::unusable(),
        };

        Challenge::usable(self.len().max(1) as f64, QueryContext::new(self.base.iid, data))
    }

    fn execute<'a>(
        &'a self,
        _op: &IndexOperator,
        context: &QueryContext,
        filter: Option<DocFilter<'a>>,
    ) -> Result<IndexIterator<'a>> {
        match *context.check_owner(self.base.iid)? {
            ContextData::Within { latitude, longitude, radius } => {
                let hits: Vec<DocRef> = self
                    .by_distance(latitude, longitude)
                    .into_iter()
                    .take_while(|(distance, _)| *distance <= radius)
                    .map(|(_, doc)| doc)
                    .collect();
                Ok(IndexIterator::new(hits.into_iter(), filter))
            }
            ContextData::Near { latitude, longitude, limit } => {
                let sorted = self.by_distance(latitude, longitude).into_iter().map(|(_, doc)| doc);
                Ok(IndexIterator::limited(sorted, filter, limit))
            }
            _ => Err(Error::internal("geo index received a foreign query context")),
        }
    }
}
