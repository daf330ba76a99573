use crate::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub property: String,
    pub descending: bool,
}

impl Sort {
    /// Parses `property` or `property,asc|desc`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(',').map(str::trim);
        let property = parts.next().filter(|p| !p.is_empty())?.to_owned();
        let descending = match parts.next() {
            None => false,
            Some(direction) if direction.eq_ignore_ascii_case("asc") => false,
            Some(direction) if direction.eq_ignore_ascii_case("desc") => true,
            Some(_) => return None,
        };
        Some(Sort {
            property,
            descending,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: Option<Sort>,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const MAX_SIZE: u32 = 1000;

    pub fn new(page: u32, size: u32, sort: Option<Sort>) -> Self {
        PageRequest {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
            sort,
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(0, Self::DEFAULT_SIZE, None)
    }
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: i64) -> Self {
        let size = i64::from(request.size);
        Page {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages: (total_elements + size - 1) / size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

/// The properties a listing may be ordered by. `Default` is the id ordering used when none is asked for.
pub trait SortKey: Copy + Default {
    fn from_property(property: &str) -> Option<Self>;

    fn resolve(sort: Option<&Sort>) -> Result<(Self, bool), Error> {
        match sort {
            None => Ok((Self::default(), false)),
            Some(sort) => Self::from_property(&sort.property)
                .map(|key| (key, sort.descending))
                .ok_or_else(|| Error::InvalidSort(sort.property.clone())),
        }
    }
}

macro_rules! sort_key {
    ($name:ident { $($variant:ident => $property:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl SortKey for $name {
            fn from_property(property: &str) -> Option<Self> {
                match property {
                    $($property => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

sort_key!(ApplicantSort {
    Id => "id",
    FirstName => "firstName",
    LastName => "lastName",
    Age => "age",
    IdNumber => "idNumber",
    VerificationStatus => "verificationStatus",
});

sort_key!(ApplicationSort {
    Id => "id",
    ApplicationDate => "applicationDate",
    Status => "status",
});

sort_key!(ParameterSort {
    Id => "id",
    Category => "category",
    Value => "value",
});

sort_key!(VillageSort {
    Id => "id",
    Name => "name",
});
